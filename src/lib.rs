//! Sheets - multi-user, server-authoritative spreadsheet store
//!
//! Clients connect over TCP, open a named sheet and exchange cell edits. The
//! server validates every edit against the sheet's dependency graph, applies
//! it, and broadcasts the resulting snapshot to every client viewing the
//! same sheet.
//!
//! # Features
//!
//! - Cycle-checked cell dependencies (a sheet's graph is always acyclic)
//! - Per-cell revert and sheet-wide undo history
//! - Live fan-out of full-sheet snapshots to every subscriber
//! - Admin observer session for users, sheets and shutdown
//! - Periodic background saves of changed sheets
//!
//! # Example
//!
//! ```
//! use royalbit_sheets::core::{Sheet, UndoOutcome};
//!
//! let mut sheet = Sheet::new("budget");
//! sheet.set_cell_contents("A1", "1", vec![])?;
//! sheet.set_cell_contents("C1", "=A1*5", vec!["A1".to_string()])?;
//!
//! // A1 is referenced by C1, so it must stay numeric or a formula.
//! assert!(sheet.set_cell_contents("A1", "x", vec![]).is_err());
//!
//! assert_eq!(sheet.undo()?, UndoOutcome::Success);
//! assert_eq!(sheet.contents("C1"), "");
//! # Ok::<(), royalbit_sheets::error::EditRejected>(())
//! ```

pub mod core;
pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use error::{EditRejected, SheetError, SheetResult};
pub use types::CellValue;
