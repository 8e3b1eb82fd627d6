//! Persisted record shapes
//!
//! A sheet is saved as one JSON object:
//!
//! ```json
//! {
//!   "name": "budget",
//!   "spreadsheet": { "A1": { "contents": 1.0, "dependencies": [] } },
//!   "edit_history": [ { "cellname": "A1", "contents": "", "dependencies": [] } ],
//!   "cell_history": { "A1": [ { "contents": "", "dependencies": [] } ] }
//! }
//! ```
//!
//! History lists are oldest first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::CellValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRecord {
    pub name: String,
    #[serde(default)]
    pub spreadsheet: BTreeMap<String, CellRecord>,
    #[serde(default)]
    pub edit_history: Vec<EditRecord>,
    #[serde(default)]
    pub cell_history: BTreeMap<String, Vec<HistoryRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub contents: CellValue,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub cellname: String,
    pub contents: CellValue,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub contents: CellValue,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Credential file: `{ "users": { "name": "password" } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersRecord {
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}
