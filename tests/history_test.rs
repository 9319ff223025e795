use std::path::PathBuf;

use chrono::{Duration, Utc};
use smartscan::history::{file_id_for, restore_files, HistoryFilter, ScanHistory, ScanHistoryDb};
use tempfile::TempDir;

fn open_db(tmp: &TempDir) -> ScanHistoryDb {
    ScanHistoryDb::new(tmp.path().join("state").join("scan_history.db")).unwrap()
}

fn row(scan: &str, source: &str, dest: &str, age_days: i64) -> ScanHistory {
    let mut row = ScanHistory::new(scan, file_id_for(source.as_ref()), source, dest);
    row.timestamp = Utc::now() - Duration::days(age_days);
    row
}

#[test]
fn rows_come_back_newest_first() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    db.add(&[
        row("s1", "/in/a.txt", "/out/a.txt", 3),
        row("s1", "/in/b.txt", "/out/b.txt", 2),
        row("s2", "/in/c.txt", "/out/c.txt", 1),
    ])
    .unwrap();

    let all = db.get(&HistoryFilter::default(), None).unwrap();
    let sources: Vec<_> = all.iter().map(|r| r.source_file.clone()).collect();
    assert_eq!(
        sources,
        vec![
            PathBuf::from("/in/c.txt"),
            PathBuf::from("/in/b.txt"),
            PathBuf::from("/in/a.txt"),
        ]
    );

    let limited = db.get(&HistoryFilter::default(), Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].scan_id, "s2");
}

#[test]
fn timestamps_survive_storage() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    let original = row("s1", "/in/a.txt", "/out/a.txt", 0);
    db.add(std::slice::from_ref(&original)).unwrap();

    let stored = db.get(&HistoryFilter::default(), None).unwrap();
    assert_eq!(stored.len(), 1);
    let drift = (stored[0].timestamp - original.timestamp).num_microseconds().unwrap();
    assert!(drift.abs() <= 1);
    assert_eq!(stored[0].file_id, original.file_id);
}

#[test]
fn filters_combine() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    db.add(&[
        row("s1", "/in/a.txt", "/out/a.txt", 10),
        row("s1", "/in/b.txt", "/out/b.txt", 5),
        row("s2", "/in/c.txt", "/out/c.txt", 1),
    ])
    .unwrap();

    let by_scan = HistoryFilter {
        scan_id: Some("s1".into()),
        ..HistoryFilter::default()
    };
    assert_eq!(db.get(&by_scan, None).unwrap().len(), 2);

    let recent = HistoryFilter::between(Some(Utc::now() - Duration::days(6)), None);
    assert_eq!(db.get(&recent, None).unwrap().len(), 2);

    let window = HistoryFilter {
        scan_id: Some("s1".into()),
        ..HistoryFilter::between(Some(Utc::now() - Duration::days(6)), Some(Utc::now()))
    };
    let hits = db.get(&window, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].destination_file, PathBuf::from("/out/b.txt"));

    let by_dest = db.get(&HistoryFilter::destination("/out/c.txt"), None).unwrap();
    assert_eq!(by_dest[0].scan_id, "s2");
}

#[test]
fn destinations_are_distinct_and_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    db.add(&[
        row("s1", "/in/b.txt", "/out/b.txt", 1),
        row("s1", "/in/a.txt", "/out/a.txt", 4),
        row("s2", "/in/a2.txt", "/out/a.txt", 2),
    ])
    .unwrap();

    let dests = db.destinations(&HistoryFilter::default()).unwrap();
    assert_eq!(dests, vec![PathBuf::from("/out/a.txt"), PathBuf::from("/out/b.txt")]);
}

#[test]
fn original_source_follows_every_hop() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    let id = file_id_for("/inbox/report.txt".as_ref());
    let mut first = ScanHistory::new("s1", id.clone(), "/inbox/report.txt", "/work/report.txt");
    first.timestamp = Utc::now() - Duration::days(2);
    let mut second = ScanHistory::new("s2", id, "/work/report.txt", "/archive/report.txt");
    second.timestamp = Utc::now() - Duration::days(1);
    db.add(&[first, second]).unwrap();

    assert_eq!(
        db.get_original_source("/archive/report.txt".as_ref()).unwrap(),
        Some(PathBuf::from("/inbox/report.txt"))
    );
    assert_eq!(
        db.get_original_source("/work/report.txt".as_ref()).unwrap(),
        Some(PathBuf::from("/inbox/report.txt"))
    );
    assert_eq!(db.get_original_source("/never/moved.txt".as_ref()).unwrap(), None);
}

#[test]
fn delete_removes_matching_rows_only() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    db.add(&[
        row("s1", "/in/a.txt", "/out/a.txt", 2),
        row("s2", "/in/b.txt", "/out/b.txt", 1),
    ])
    .unwrap();

    let deleted = db
        .delete(&HistoryFilter {
            scan_id: Some("s1".into()),
            ..HistoryFilter::default()
        })
        .unwrap();

    assert_eq!(deleted, 1);
    let left = db.get(&HistoryFilter::default(), None).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].scan_id, "s2");
}

#[test]
fn clear_removes_the_database() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    db.add(&[row("s1", "/in/a.txt", "/out/a.txt", 0)]).unwrap();
    assert!(db.path().exists());

    db.clear().unwrap();

    assert!(!db.path().exists());
    // Reopening starts from an empty log.
    let db = open_db(&tmp);
    assert!(db.get(&HistoryFilter::default(), None).unwrap().is_empty());
}

#[test]
fn restore_moves_files_back_and_skips_unknown() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    let inbox = tmp.path().join("inbox");
    let sorted = tmp.path().join("sorted");
    std::fs::create_dir_all(&sorted).unwrap();
    let moved = sorted.join("a.txt");
    std::fs::write(&moved, "hello").unwrap();
    let stranger = sorted.join("b.txt");
    std::fs::write(&stranger, "hi").unwrap();
    let original = inbox.join("a.txt");
    db.add(&[ScanHistory::new("s1", file_id_for(&original), &original, &moved)])
        .unwrap();

    let report = restore_files(&db, &[moved.clone(), stranger.clone()]).unwrap();

    assert_eq!(report.restored, vec![(moved.clone(), original.clone())]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, stranger);
    assert_eq!(std::fs::read_to_string(&original).unwrap(), "hello");
    assert!(!moved.exists());
    assert!(stranger.exists());
    // Restoring writes no history.
    assert_eq!(db.get(&HistoryFilter::default(), None).unwrap().len(), 1);
}

#[test]
fn restore_never_overwrites() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    let inbox = tmp.path().join("inbox");
    let sorted = tmp.path().join("sorted");
    std::fs::create_dir_all(&inbox).unwrap();
    std::fs::create_dir_all(&sorted).unwrap();
    let original = inbox.join("a.txt");
    std::fs::write(&original, "newer file").unwrap();
    let moved = sorted.join("a.txt");
    std::fs::write(&moved, "sorted file").unwrap();
    db.add(&[ScanHistory::new("s1", file_id_for(&original), &original, &moved)])
        .unwrap();

    let report = restore_files(&db, &[moved.clone()]).unwrap();

    assert!(report.restored.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(std::fs::read_to_string(&original).unwrap(), "newer file");
    assert_eq!(std::fs::read_to_string(&moved).unwrap(), "sorted file");
}

#[test]
fn lineage_is_keyed_by_path() {
    let tmp = TempDir::new().unwrap();
    let db = open_db(&tmp);
    let inbox = tmp.path().join("inbox");
    let sorted = tmp.path().join("sorted");
    std::fs::create_dir_all(&sorted).unwrap();
    let original = inbox.join("a.txt");
    let moved = sorted.join("a.txt");
    std::fs::write(&moved, "first").unwrap();
    db.add(&[ScanHistory::new("s1", file_id_for(&original), &original, &moved)])
        .unwrap();
    restore_files(&db, &[moved.clone()]).unwrap();

    // A different file later dropped at the same destination follows the old chain.
    std::fs::write(&moved, "second").unwrap();
    assert_eq!(db.get_original_source(&moved).unwrap(), Some(original));
}
