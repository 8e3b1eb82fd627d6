//! Concurrent dependency-graph store: cells, graph index and sheet store

pub mod cell;
pub mod graph;
pub mod record;
pub mod sheet;

pub use cell::{Cell, CellSnapshot};
pub use graph::DependencyGraph;
pub use record::{SheetRecord, UsersRecord};
pub use sheet::{Sheet, UndoOutcome};
