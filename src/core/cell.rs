/// State of one cell captured before a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSnapshot {
    pub cell: String,
    pub contents: String,
    pub dependencies: Vec<String>,
}

impl CellSnapshot {
    /// Snapshot of a cell that has never been written.
    pub fn empty(cell: &str) -> Self {
        Self {
            cell: cell.to_string(),
            contents: String::new(),
            dependencies: Vec::new(),
        }
    }
}

/// A named cell with its current contents, declared dependencies and the
/// stack of values it held before each write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub(crate) name: String,
    pub(crate) contents: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) history: Vec<CellSnapshot>,
}

impl Cell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            contents: String::new(),
            dependencies: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Oldest snapshot first; the last entry is the next one `revert` restores.
    pub fn history(&self) -> &[CellSnapshot] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.dependencies.is_empty()
    }

    pub(crate) fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            cell: self.name.clone(),
            contents: self.contents.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}
