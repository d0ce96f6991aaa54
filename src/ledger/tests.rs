use super::*;
use serde_json::json;
use std::io::Write;
use tempfile::TempDir;

fn create_test_ledger() -> (JsonLedger, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let ledger = JsonLedger::new(dir.path().join("logs/evidence_ledger.jsonl"));
    (ledger, dir)
}

#[test]
fn test_append_and_read() {
    let (ledger, _dir) = create_test_ledger();

    ledger
        .append(&json!({"label": "cat", "accepted": true}))
        .unwrap();
    ledger
        .append(&json!({"label": "dog", "accepted": false}))
        .unwrap();

    let entries = ledger.read_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["label"], "cat");
    assert_eq!(entries[1]["accepted"], false);
}

#[test]
fn test_lines_are_compact_json() {
    let (ledger, _dir) = create_test_ledger();
    ledger.append(&json!({"a": 1, "b": [1, 2]})).unwrap();

    let text = std::fs::read_to_string(ledger.path()).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(!text.contains(": "));
    assert!(text.ends_with('\n'));
}

#[test]
fn test_missing_file_reads_empty() {
    let (ledger, _dir) = create_test_ledger();
    assert!(ledger.is_empty().unwrap());
}

#[test]
fn test_truncated_trailing_line_tolerated() {
    let (ledger, _dir) = create_test_ledger();
    ledger.append(&json!({"n": 1})).unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(ledger.path())
        .unwrap();
    file.write_all(b"{\"n\": 2, \"trunc").unwrap();

    let entries = ledger.read_entries().unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_corrupt_middle_line_is_error() {
    let (ledger, _dir) = create_test_ledger();
    std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
    std::fs::write(ledger.path(), "{\"n\":1}\nnot json\n{\"n\":3}\n").unwrap();

    let result = ledger.read_entries();
    assert!(matches!(result, Err(LedgerError::Corrupt { line: 2, .. })));
}

#[test]
fn test_append_record_serializes_struct() {
    #[derive(Serialize)]
    struct Row<'a> {
        label: &'a str,
        medoids: usize,
    }

    let (ledger, _dir) = create_test_ledger();
    ledger
        .append_record(&Row {
            label: "mug",
            medoids: 3,
        })
        .unwrap();

    assert_eq!(ledger.len().unwrap(), 1);
    assert_eq!(ledger.location(), Some(ledger.path()));
}
