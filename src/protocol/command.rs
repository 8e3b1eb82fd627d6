//! Client requests
//!
//! Each inbound record is a JSON object whose `type` field selects one
//! variant. Fields a variant does not use are ignored.

use serde::Deserialize;

use crate::error::{SheetError, SheetResult};
use crate::types::CellValue;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Open {
        name: String,
        username: String,
        password: String,
    },
    Edit {
        cell: String,
        value: CellValue,
        dependencies: Vec<String>,
    },
    Undo,
    Revert {
        cell: String,
    },
    Admin,
    Close,
    User {
        order: UserOrder,
        username: String,
        password: String,
    },
    Sheet {
        order: SheetOrder,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserOrder {
    New,
    Change,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetOrder {
    New,
    Delete,
}

impl Command {
    /// Decode one record. Anything that is not a complete, known command is
    /// `MalformedCommand`.
    pub fn decode(payload: &str) -> SheetResult<Self> {
        serde_json::from_str(payload.trim())
            .map_err(|e| SheetError::MalformedCommand(e.to_string()))
    }

    /// The `type` discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Open { .. } => "open",
            Command::Edit { .. } => "edit",
            Command::Undo => "undo",
            Command::Revert { .. } => "revert",
            Command::Admin => "admin",
            Command::Close => "close",
            Command::User { .. } => "user",
            Command::Sheet { .. } => "sheet",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open_ignores_order() {
        let cmd = Command::decode(
            r#"{"type":"open","order":"x","name":"budget","username":"ann","password":"pw"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::Open {
                name: "budget".into(),
                username: "ann".into(),
                password: "pw".into(),
            }
        );
    }

    #[test]
    fn test_decode_edit_numeric_value() {
        let cmd = Command::decode(r#"{"type":"edit","cell":"A1","value":5,"dependencies":[]}"#)
            .unwrap();
        match cmd {
            Command::Edit { value, .. } => assert_eq!(value.into_contents(), "5"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_decode_unit_commands() {
        assert_eq!(Command::decode(r#"{"type":"undo"}"#).unwrap(), Command::Undo);
        assert_eq!(Command::decode(r#"{"type":"admin"}"#).unwrap(), Command::Admin);
        assert_eq!(Command::decode("{\"type\":\"close\"}\n\n").unwrap(), Command::Close);
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let err = Command::decode(r#"{"type":"open","name":"budget"}"#).unwrap_err();
        assert!(matches!(err, SheetError::MalformedCommand(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_garbage() {
        assert!(Command::decode(r#"{"type":"explode"}"#).is_err());
        assert!(Command::decode("not json").is_err());
        assert!(Command::decode(r#"{"cell":"A1"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_order() {
        assert!(Command::decode(r#"{"type":"sheet","order":"rename","name":"x"}"#).is_err());
    }

    #[test]
    fn test_kind_matches_wire_type() {
        assert_eq!(Command::Undo.kind(), "undo");
        assert_eq!(
            Command::Sheet {
                order: SheetOrder::New,
                name: "s".into()
            }
            .kind(),
            "sheet"
        );
    }
}
