//! Persistence adapter
//!
//! Sheet records, the sheet-name index and the credential file. File writes
//! are serialized by their own I/O lock, separate from the coordination lock,
//! so saving never blocks edit processing.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use crate::core::{SheetRecord, UsersRecord};
use crate::error::SheetResult;

const SHEET_EXTENSION: &str = "sprd";
const NAMES_FILE: &str = "sprd_names";
const USERS_FILE: &str = "users";

pub type Credentials = BTreeMap<String, String>;

pub trait SheetRepository: Send + Sync {
    fn load_sheet_names(&self) -> SheetResult<Vec<String>>;
    fn save_sheet_names(&self, names: &[String]) -> SheetResult<()>;

    /// `None` when no record was ever saved under `name`.
    fn load_sheet(&self, name: &str) -> SheetResult<Option<SheetRecord>>;
    fn save_sheet(&self, record: &SheetRecord) -> SheetResult<()>;
    fn remove_sheet(&self, name: &str) -> SheetResult<()>;

    fn load_users(&self) -> SheetResult<Credentials>;
    fn save_users(&self, users: &Credentials) -> SheetResult<()>;
}

//==============================================================================
// File-backed repository
//==============================================================================

/// Layout under `root`: `<name>.sprd`, `sprd_names` and `users`.
pub struct FileRepository {
    root: PathBuf,
    io_lock: Mutex<()>,
}

impl FileRepository {
    pub fn open(root: impl Into<PathBuf>) -> SheetResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            io_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sheet_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{SHEET_EXTENSION}"))
    }

    fn io(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write to a uniquely named temp file in `root`, then persist it over
    /// the target. A failed write leaves no temp file behind.
    fn write_atomic(&self, path: &Path, contents: &str) -> SheetResult<()> {
        let _io = self.io();
        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_optional(&self, path: &Path) -> SheetResult<Option<String>> {
        let _io = self.io();
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SheetRepository for FileRepository {
    fn load_sheet_names(&self) -> SheetResult<Vec<String>> {
        let text = self.read_optional(&self.root.join(NAMES_FILE))?;
        Ok(text
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn save_sheet_names(&self, names: &[String]) -> SheetResult<()> {
        let mut text = String::new();
        for name in names {
            text.push_str(name);
            text.push('\n');
        }
        self.write_atomic(&self.root.join(NAMES_FILE), &text)
    }

    fn load_sheet(&self, name: &str) -> SheetResult<Option<SheetRecord>> {
        match self.read_optional(&self.sheet_path(name))? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn save_sheet(&self, record: &SheetRecord) -> SheetResult<()> {
        let text = serde_json::to_string_pretty(record)?;
        self.write_atomic(&self.sheet_path(&record.name), &text)
    }

    fn remove_sheet(&self, name: &str) -> SheetResult<()> {
        let _io = self.io();
        match fs::remove_file(self.sheet_path(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn load_users(&self) -> SheetResult<Credentials> {
        match self.read_optional(&self.root.join(USERS_FILE))? {
            Some(text) => Ok(serde_json::from_str::<UsersRecord>(&text)?.users),
            None => Ok(Credentials::new()),
        }
    }

    fn save_users(&self, users: &Credentials) -> SheetResult<()> {
        let record = UsersRecord {
            users: users.clone(),
        };
        let text = serde_json::to_string_pretty(&record)?;
        self.write_atomic(&self.root.join(USERS_FILE), &text)
    }
}

//==============================================================================
// In-memory repository
//==============================================================================

/// Repository that never touches disk.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    names: Vec<String>,
    sheets: HashMap<String, SheetRecord>,
    users: Credentials,
    sheet_saves: usize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sheet records written so far.
    pub fn sheet_saves(&self) -> usize {
        self.state().sheet_saves
    }

    pub fn saved_sheet(&self, name: &str) -> Option<SheetRecord> {
        self.state().sheets.get(name).cloned()
    }
}

impl SheetRepository for MemoryRepository {
    fn load_sheet_names(&self) -> SheetResult<Vec<String>> {
        Ok(self.state().names.clone())
    }

    fn save_sheet_names(&self, names: &[String]) -> SheetResult<()> {
        self.state().names = names.to_vec();
        Ok(())
    }

    fn load_sheet(&self, name: &str) -> SheetResult<Option<SheetRecord>> {
        Ok(self.state().sheets.get(name).cloned())
    }

    fn save_sheet(&self, record: &SheetRecord) -> SheetResult<()> {
        let mut state = self.state();
        state.sheet_saves += 1;
        state.sheets.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn remove_sheet(&self, name: &str) -> SheetResult<()> {
        self.state().sheets.remove(name);
        Ok(())
    }

    fn load_users(&self) -> SheetResult<Credentials> {
        Ok(self.state().users.clone())
    }

    fn save_users(&self, users: &Credentials) -> SheetResult<()> {
        self.state().users = users.clone();
        Ok(())
    }
}
