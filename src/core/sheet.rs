//! Sheet store
//!
//! Owns the cells of one named spreadsheet, the dependency graph index kept
//! in step with every cell's dependency list, and the global edit history.
//! Every mutation is validated first and applied whole; a rejected mutation
//! leaves the store untouched.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::cell::{Cell, CellSnapshot};
use super::graph::DependencyGraph;
use super::record::{CellRecord, EditRecord, HistoryRecord, SheetRecord};
use crate::error::{EditRejected, SheetError, SheetResult};
use crate::types::{is_referenceable, CellValue};

/// Result of a successful [`Sheet::undo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The most recent edit was rolled back.
    Success,
    /// Nothing to undo; the sheet is unchanged.
    Empty,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    cells: HashMap<String, Cell>,
    graph: DependencyGraph,
    edit_history: Vec<CellSnapshot>,
    dirty: bool,
}

impl Sheet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: HashMap::new(),
            graph: DependencyGraph::new(),
            edit_history: Vec::new(),
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contents of `cell`, or `""` when it was never written.
    pub fn contents(&self, cell: &str) -> &str {
        self.cells.get(cell).map_or("", |c| c.contents.as_str())
    }

    pub fn dependencies(&self, cell: &str) -> &[String] {
        self.cells.get(cell).map_or(&[], |c| c.dependencies.as_slice())
    }

    /// Every cell ever written, sorted. Emptied cells stay listed.
    pub fn cell_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.cells.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn cell(&self, cell: &str) -> Option<&Cell> {
        self.cells.get(cell)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Oldest first; the last entry is the next one `undo` restores.
    pub fn edit_history(&self) -> &[CellSnapshot] {
        &self.edit_history
    }

    pub fn cell_history(&self, cell: &str) -> &[CellSnapshot] {
        self.cells.get(cell).map_or(&[], |c| c.history.as_slice())
    }

    /// Unsaved mutations since the last successful save?
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Write `contents` and `dependencies` to `cell`.
    ///
    /// The previous state is pushed onto both the cell's history and the
    /// sheet's edit history.
    pub fn set_cell_contents(
        &mut self,
        cell: &str,
        contents: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<(), EditRejected> {
        let contents = contents.into();
        self.validate(cell, &contents, &dependencies)?;
        self.apply(cell, contents, dependencies, true);
        Ok(())
    }

    /// Restore `cell` to the value it held before its most recent write.
    ///
    /// Never-written cells are a no-op. A cell whose history is exhausted is
    /// cleared. The restore is validated like any other write and recorded
    /// in the edit history, so it can itself be undone.
    pub fn revert_cell(&mut self, cell: &str) -> Result<(), EditRejected> {
        let Some(current) = self.cells.get(cell) else {
            return Ok(());
        };

        let Some(previous) = current.history.last().cloned() else {
            if current.is_empty() {
                return Ok(());
            }
            self.validate(cell, "", &[])?;
            self.replace(cell, String::new(), Vec::new());
            return Ok(());
        };

        self.validate(cell, &previous.contents, &previous.dependencies)?;
        if let Some(entry) = self.cells.get_mut(cell) {
            entry.history.pop();
        }
        self.apply(cell, previous.contents, previous.dependencies, false);
        Ok(())
    }

    /// Roll back the most recent edit to any cell of this sheet.
    ///
    /// On `Err` the snapshot stays on the history stack and nothing changes.
    pub fn undo(&mut self) -> Result<UndoOutcome, EditRejected> {
        let Some(snapshot) = self.edit_history.last().cloned() else {
            return Ok(UndoOutcome::Empty);
        };

        self.validate(&snapshot.cell, &snapshot.contents, &snapshot.dependencies)?;
        self.edit_history.pop();
        if let Some(entry) = self.cells.get_mut(&snapshot.cell) {
            entry.history.pop();
        }
        self.replace(&snapshot.cell, snapshot.contents, snapshot.dependencies);
        Ok(UndoOutcome::Success)
    }

    fn validate(
        &self,
        cell: &str,
        contents: &str,
        dependencies: &[String],
    ) -> Result<(), EditRejected> {
        if self.graph.has_dependents(cell) && !is_referenceable(contents) {
            return Err(EditRejected::InvalidDependency {
                cell: cell.to_string(),
            });
        }

        if let Some(dependee) = dependencies
            .iter()
            .find(|dependee| self.graph.would_create_cycle(dependee, cell))
        {
            debug!(sheet = %self.name, cell, dependee = %dependee, "edit would close a cycle");
            return Err(EditRejected::CircularDependency {
                cell: cell.to_string(),
            });
        }

        Ok(())
    }

    /// Record the pre-mutation snapshot, then replace.
    fn apply(
        &mut self,
        cell: &str,
        contents: String,
        dependencies: Vec<String>,
        into_cell_history: bool,
    ) {
        let entry = self
            .cells
            .entry(cell.to_string())
            .or_insert_with(|| Cell::new(cell));
        let snapshot = entry.snapshot();
        if into_cell_history {
            entry.history.push(snapshot.clone());
        }
        self.edit_history.push(snapshot);
        self.replace(cell, contents, dependencies);
    }

    /// Swap a cell's value and rewire its edges without touching history.
    fn replace(&mut self, cell: &str, contents: String, dependencies: Vec<String>) {
        let entry = self
            .cells
            .entry(cell.to_string())
            .or_insert_with(|| Cell::new(cell));
        entry.contents = contents;
        let old = std::mem::replace(&mut entry.dependencies, dependencies);

        for dependee in &old {
            self.graph.remove_edge(dependee, cell);
        }
        for dependee in self.dependencies(cell).to_vec() {
            self.graph.add_edge(&dependee, cell);
        }

        debug_assert!(self.graph.is_consistent());
        self.dirty = true;
    }

    //==========================================================================
    // Records
    //==========================================================================

    /// Serialize every cell, the edit history and each cell's history.
    pub fn to_record(&self) -> SheetRecord {
        let spreadsheet = self
            .cells
            .values()
            .map(|cell| {
                (
                    cell.name.clone(),
                    CellRecord {
                        contents: CellValue::for_storage(&cell.contents),
                        dependencies: cell.dependencies.clone(),
                    },
                )
            })
            .collect();

        let edit_history = self
            .edit_history
            .iter()
            .map(|snapshot| EditRecord {
                cellname: snapshot.cell.clone(),
                contents: CellValue::for_storage(&snapshot.contents),
                dependencies: snapshot.dependencies.clone(),
            })
            .collect();

        let cell_history: BTreeMap<String, Vec<HistoryRecord>> = self
            .cells
            .values()
            .map(|cell| {
                let entries = cell
                    .history
                    .iter()
                    .map(|snapshot| HistoryRecord {
                        contents: CellValue::for_storage(&snapshot.contents),
                        dependencies: snapshot.dependencies.clone(),
                    })
                    .collect();
                (cell.name.clone(), entries)
            })
            .collect();

        SheetRecord {
            name: self.name.clone(),
            spreadsheet,
            edit_history,
            cell_history,
        }
    }

    /// Rebuild a sheet from its record. The graph is re-derived from the
    /// cells' dependency lists and must be acyclic.
    pub fn from_record(record: SheetRecord) -> SheetResult<Self> {
        let mut sheet = Sheet::new(record.name);

        for (name, stored) in record.spreadsheet {
            let mut cell = Cell::new(&name);
            cell.contents = stored.contents.into_contents();
            cell.dependencies = stored.dependencies;
            for dependee in &cell.dependencies {
                sheet.graph.add_edge(dependee, &name);
            }
            sheet.cells.insert(name, cell);
        }

        for (name, entries) in record.cell_history {
            let cell = sheet
                .cells
                .entry(name.clone())
                .or_insert_with(|| Cell::new(&name));
            cell.history = entries
                .into_iter()
                .map(|entry| CellSnapshot {
                    cell: name.clone(),
                    contents: entry.contents.into_contents(),
                    dependencies: entry.dependencies,
                })
                .collect();
        }

        sheet.edit_history = record
            .edit_history
            .into_iter()
            .map(|entry| CellSnapshot {
                cell: entry.cellname,
                contents: entry.contents.into_contents(),
                dependencies: entry.dependencies,
            })
            .collect();

        if !sheet.graph.is_acyclic() {
            return Err(SheetError::CorruptRecord(format!(
                "spreadsheet '{}' contains a circular dependency",
                sheet.name
            )));
        }

        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_absent_cell_reads_empty() {
        let sheet = Sheet::new("t");
        assert_eq!(sheet.contents("Q7"), "");
        assert!(sheet.dependencies("Q7").is_empty());
        assert!(sheet.cell_names().is_empty());
        assert!(!sheet.is_dirty());
    }

    #[test]
    fn test_first_write_records_empty_snapshot() {
        let mut sheet = Sheet::new("t");
        sheet.set_cell_contents("A1", "1", vec![]).unwrap();

        assert_eq!(sheet.cell_history("A1"), &[CellSnapshot::empty("A1")]);
        assert_eq!(sheet.edit_history(), &[CellSnapshot::empty("A1")]);
        assert!(sheet.is_dirty());
    }

    #[test]
    fn test_rewiring_replaces_old_edges() {
        let mut sheet = Sheet::new("t");
        sheet.set_cell_contents("C1", "=A1", deps(&["A1"])).unwrap();
        sheet.set_cell_contents("C1", "=B1", deps(&["B1"])).unwrap();

        assert!(!sheet.graph().has_dependents("A1"));
        assert_eq!(sheet.graph().dependents_of("B1"), vec!["C1"]);
        assert_eq!(sheet.graph().edge_count(), 1);
    }

    #[test]
    fn test_rejected_write_leaves_history_alone() {
        let mut sheet = Sheet::new("t");
        sheet.set_cell_contents("A1", "=A1", deps(&["A1"])).unwrap_err();
        assert!(sheet.edit_history().is_empty());
        assert!(sheet.cell_names().is_empty());
        assert!(!sheet.is_dirty());
    }

    #[test]
    fn test_revert_after_exhausted_history_clears_cell() {
        let mut sheet = Sheet::new("t");
        sheet.set_cell_contents("A1", "1", vec![]).unwrap();
        sheet.revert_cell("A1").unwrap();
        assert_eq!(sheet.contents("A1"), "");

        // History is now empty but the cell is already blank.
        sheet.revert_cell("A1").unwrap();
        assert_eq!(sheet.contents("A1"), "");
        assert_eq!(sheet.cell_names(), vec!["A1"]);
    }

    #[test]
    fn test_undo_restores_edges() {
        let mut sheet = Sheet::new("t");
        sheet.set_cell_contents("B1", "=A1", deps(&["A1"])).unwrap();
        sheet.set_cell_contents("B1", "7", vec![]).unwrap();
        assert!(!sheet.graph().has_dependents("A1"));

        assert_eq!(sheet.undo(), Ok(UndoOutcome::Success));
        assert_eq!(sheet.graph().dependents_of("A1"), vec!["B1"]);
        assert_eq!(sheet.contents("B1"), "=A1");
    }
}
