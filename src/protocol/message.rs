//! Server-to-client messages

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use super::frame::RECORD_TERMINATOR;
use crate::core::Sheet;
use crate::error::SheetResult;
use crate::types::CellValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "full send")]
    FullSend {
        spreadsheet: BTreeMap<String, CellValue>,
    },
    #[serde(rename = "error")]
    Error { code: ErrorCode, source: String },
    #[serde(rename = "list")]
    List { spreadsheets: Vec<String> },
    #[serde(rename = "state")]
    State { users: BTreeMap<String, String> },
    #[serde(rename = "message")]
    Message { msg: String },
}

/// Numeric error codes of the `error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadCredentials,
    CircularDependency,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::BadCredentials => 1,
            ErrorCode::CircularDependency => 2,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl ServerMessage {
    /// Snapshot of every cell; fully numeric contents are sent as numbers.
    pub fn full_send(sheet: &Sheet) -> Self {
        let spreadsheet = sheet
            .cell_names()
            .into_iter()
            .map(|name| (name.to_string(), CellValue::for_display(sheet.contents(name))))
            .collect();
        ServerMessage::FullSend { spreadsheet }
    }

    pub fn bad_credentials() -> Self {
        ServerMessage::Error {
            code: ErrorCode::BadCredentials,
            source: String::new(),
        }
    }

    pub fn circular_dependency(cell: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: ErrorCode::CircularDependency,
            source: cell.into(),
        }
    }

    pub fn list(spreadsheets: Vec<String>) -> Self {
        ServerMessage::List { spreadsheets }
    }

    pub fn state(users: BTreeMap<String, String>) -> Self {
        ServerMessage::State { users }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        ServerMessage::Message { msg: msg.into() }
    }

    /// JSON text followed by the record terminator.
    pub fn encode(&self) -> SheetResult<String> {
        let mut text = serde_json::to_string(self)?;
        text.push_str(RECORD_TERMINATOR);
        Ok(text)
    }
}
