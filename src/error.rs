use thiserror::Error;

pub type SheetResult<T> = Result<T, SheetError>;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error(transparent)]
    Edit(#[from] EditRejected),

    #[error("Bad credentials for user '{0}'")]
    BadCredentials(String),

    #[error("Spreadsheet '{0}' has active subscribers")]
    SheetInUse(String),

    #[error("Corrupt spreadsheet record: {0}")]
    CorruptRecord(String),

    #[error("Inbound record exceeds {0} bytes")]
    FrameTooLarge(usize),
}

/// A mutation the sheet store refused. The store is unchanged when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditRejected {
    #[error("Circular dependency detected at cell {cell}")]
    CircularDependency { cell: String },

    #[error("Invalid dependency: cell {cell} is referenced by other cells and must hold a number or formula")]
    InvalidDependency { cell: String },
}

impl EditRejected {
    /// The cell whose write was refused.
    pub fn cell(&self) -> &str {
        match self {
            EditRejected::CircularDependency { cell } | EditRejected::InvalidDependency { cell } => {
                cell
            }
        }
    }
}
