//! Wire protocol tests: framing, command decoding and message shapes

use pretty_assertions::assert_eq;
use royalbit_sheets::core::Sheet;
use royalbit_sheets::protocol::{Command, FrameBuffer, ServerMessage, UserOrder};
use royalbit_sheets::CellValue;
use serde_json::{json, Value};

fn wire(message: &ServerMessage) -> Value {
    let text = message.encode().unwrap();
    assert!(text.ends_with("\n\n"));
    assert!(!text.trim_end().contains("\n\n"));
    serde_json::from_str(text.trim_end()).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// FRAMING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_frames_decode_in_order() {
    let mut frames = FrameBuffer::new();
    frames
        .extend(b"{\"type\":\"admin\"}\n\n\n\n{\"type\":\"user\",\"order\":\"new\",")
        .unwrap();
    frames
        .extend(b"\"username\":\"ann\",\"password\":\"pw\"}\n\n")
        .unwrap();

    let mut commands = Vec::new();
    while let Some(record) = frames.next_record().unwrap() {
        commands.push(Command::decode(&record).unwrap());
    }
    assert_eq!(
        commands,
        vec![
            Command::Admin,
            Command::User {
                order: UserOrder::New,
                username: "ann".into(),
                password: "pw".into(),
            },
        ]
    );
    assert_eq!(frames.pending_len(), 0);
}

#[test]
fn test_edit_accepts_string_or_number_value() {
    let text = Command::decode(
        r#"{"type":"edit","cell":"B2","value":"=A1+1","dependencies":["A1"]}"#,
    )
    .unwrap();
    assert_eq!(
        text,
        Command::Edit {
            cell: "B2".into(),
            value: CellValue::Text("=A1+1".into()),
            dependencies: vec!["A1".into()],
        }
    );

    let number =
        Command::decode(r#"{"type":"edit","cell":"B2","value":1.5,"dependencies":[]}"#).unwrap();
    assert!(matches!(
        number,
        Command::Edit { value: CellValue::Number(n), .. } if n == 1.5
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// SERVER MESSAGES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_full_send_shape() {
    let mut sheet = Sheet::new("T");
    sheet.set_cell_contents("A1", "1", vec![]).unwrap();
    sheet.set_cell_contents("A2", "5.0", vec![]).unwrap();
    sheet
        .set_cell_contents("C1", "=A1*5", vec!["A1".into()])
        .unwrap();
    sheet.set_cell_contents("D1", "text", vec![]).unwrap();

    assert_eq!(
        wire(&ServerMessage::full_send(&sheet)),
        json!({
            "type": "full send",
            "spreadsheet": { "A1": 1.0, "A2": 5.0, "C1": "=A1*5", "D1": "text" }
        })
    );
}

#[test]
fn test_error_list_state_and_message_shapes() {
    assert_eq!(
        wire(&ServerMessage::bad_credentials()),
        json!({ "type": "error", "code": 1, "source": "" })
    );
    assert_eq!(
        wire(&ServerMessage::circular_dependency("B7")),
        json!({ "type": "error", "code": 2, "source": "B7" })
    );
    assert_eq!(
        wire(&ServerMessage::list(vec!["a".into(), "b".into()])),
        json!({ "type": "list", "spreadsheets": ["a", "b"] })
    );

    let mut users = std::collections::BTreeMap::new();
    users.insert("ann".to_string(), "pw".to_string());
    assert_eq!(
        wire(&ServerMessage::state(users)),
        json!({ "type": "state", "users": { "ann": "pw" } })
    );
    assert_eq!(
        wire(&ServerMessage::message("hi")),
        json!({ "type": "message", "msg": "hi" })
    );
}
