//! Spreadsheet server: configuration, persistence, session coordination and
//! the TCP runner.

pub mod config;
pub mod coordinator;
pub mod persistence;
pub mod run;
pub mod session;

pub use config::ServerConfig;
pub use coordinator::{Coordinator, Dispatch, Flow, Outbound, SessionId};
pub use persistence::{FileRepository, MemoryRepository, SheetRepository};
pub use run::SheetServer;
