//! File repository tests: layout, atomic writes and reload

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use royalbit_sheets::core::Sheet;
use royalbit_sheets::server::persistence::Credentials;
use royalbit_sheets::server::{Coordinator, FileRepository, SheetRepository};
use royalbit_sheets::SheetError;
use tempfile::TempDir;

fn repository() -> (TempDir, FileRepository) {
    let dir = TempDir::new().unwrap();
    let repository = FileRepository::open(dir.path().join("data")).unwrap();
    (dir, repository)
}

// ═══════════════════════════════════════════════════════════════════════════
// EMPTY DATA DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_open_creates_missing_directory() {
    let (dir, repository) = repository();
    assert!(dir.path().join("data").is_dir());
    assert_eq!(repository.root(), dir.path().join("data"));
}

#[test]
fn test_missing_files_load_as_empty() {
    let (_dir, repository) = repository();
    assert!(repository.load_sheet_names().unwrap().is_empty());
    assert!(repository.load_users().unwrap().is_empty());
    assert!(repository.load_sheet("nope").unwrap().is_none());
    repository.remove_sheet("nope").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE LAYOUT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_sheet_names_one_per_line() {
    let (_dir, repository) = repository();
    let names = vec!["alpha".to_string(), "beta".to_string()];
    repository.save_sheet_names(&names).unwrap();

    let text = fs::read_to_string(repository.root().join("sprd_names")).unwrap();
    assert_eq!(text, "alpha\nbeta\n");
    assert_eq!(repository.load_sheet_names().unwrap(), names);
}

#[test]
fn test_users_file_shape() {
    let (_dir, repository) = repository();
    let mut users = Credentials::new();
    users.insert("ann".to_string(), "pw".to_string());
    repository.save_users(&users).unwrap();

    let text = fs::read_to_string(repository.root().join("users")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value, serde_json::json!({ "users": { "ann": "pw" } }));
    assert_eq!(repository.load_users().unwrap(), users);
}

#[test]
fn test_sheet_record_written_atomically() {
    let (_dir, repository) = repository();
    let mut sheet = Sheet::new("budget");
    sheet.set_cell_contents("A1", "42", vec![]).unwrap();
    repository.save_sheet(&sheet.to_record()).unwrap();

    let path = repository.sheet_path("budget");
    assert!(path.ends_with("budget.sprd"));
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let record = repository.load_sheet("budget").unwrap().unwrap();
    assert_eq!(record, sheet.to_record());

    repository.remove_sheet("budget").unwrap();
    assert!(!path.exists());
}

#[test]
fn test_sheet_named_like_credential_file_leaves_only_final_files() {
    let (_dir, repository) = repository();
    let mut users = Credentials::new();
    users.insert("ann".to_string(), "pw".to_string());

    let mut sheet = Sheet::new("users");
    sheet.set_cell_contents("A1", "1", vec![]).unwrap();

    for _ in 0..3 {
        repository.save_users(&users).unwrap();
        repository.save_sheet(&sheet.to_record()).unwrap();
        repository.save_sheet_names(&["users".to_string()]).unwrap();
    }

    let mut entries: Vec<String> = fs::read_dir(repository.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["sprd_names", "users", "users.sprd"]);

    assert_eq!(repository.load_users().unwrap(), users);
    let record = repository.load_sheet("users").unwrap().unwrap();
    assert_eq!(record, sheet.to_record());
}

#[test]
fn test_corrupt_sheet_file_is_an_error() {
    let (_dir, repository) = repository();
    fs::write(repository.sheet_path("broken"), "{ not json").unwrap();
    assert!(matches!(
        repository.load_sheet("broken"),
        Err(SheetError::Json(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// COORDINATOR RELOAD
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_coordinator_reloads_from_disk() {
    let dir = TempDir::new().unwrap();

    let repository = Arc::new(FileRepository::open(dir.path()).unwrap());
    let mut sheet = Sheet::new("plan");
    sheet.set_cell_contents("A1", "1", vec![]).unwrap();
    sheet
        .set_cell_contents("B1", "=A1", vec!["A1".to_string()])
        .unwrap();
    repository.save_sheet(&sheet.to_record()).unwrap();
    repository
        .save_sheet_names(&["plan".to_string(), "fresh".to_string()])
        .unwrap();

    let coordinator = Coordinator::load(repository).unwrap();
    assert_eq!(coordinator.sheet_names(), vec!["fresh", "plan"]);

    let (contents, dependents) = coordinator
        .with_sheet("plan", |sheet| {
            (
                sheet.contents("B1").to_string(),
                sheet.graph().dependents_of("A1").len(),
            )
        })
        .unwrap();
    assert_eq!(contents, "=A1");
    assert_eq!(dependents, 1);

    // Indexed sheet with no record yet loads empty.
    let cells = coordinator
        .with_sheet("fresh", |sheet| sheet.cell_names().len())
        .unwrap();
    assert_eq!(cells, 0);
}

#[test]
fn test_coordinator_refuses_cyclic_record() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(FileRepository::open(dir.path()).unwrap());
    repository
        .save_sheet_names(&["loop".to_string()])
        .unwrap();
    fs::write(
        repository.sheet_path("loop"),
        r#"{
            "name": "loop",
            "spreadsheet": {
                "A1": { "contents": "=B1", "dependencies": ["B1"] },
                "B1": { "contents": "=A1", "dependencies": ["A1"] }
            }
        }"#,
    )
    .unwrap();

    let result = Coordinator::load(repository);
    assert!(matches!(result, Err(SheetError::CorruptRecord(_))));
}
