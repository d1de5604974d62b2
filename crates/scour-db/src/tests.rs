//! Integration tests for database state, snapshots and garbage collection.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use scour_index::{DiskIterator, FileResultWriter, MemoryResultWriter, ResultWriter};
use scour_query::Query;
use scour_types::{ConnId, DatasetId, IteratorId};

use crate::{Config, ConfigKey, Database, DbChange, Lock};

fn conn(byte: u8) -> ConnId {
    ConnId::from(&[byte][..])
}

fn write_corpus(dir: &Path, entries: &[(&str, &[u8])]) -> Vec<String> {
    let mut files = Vec::new();
    for (name, contents) in entries {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        files.push(path.to_string_lossy().into_owned());
    }
    files
}

/// Builds a dataset through the normal task path and returns its id.
fn index_corpus(db: &Database, corpus_dir: &Path, entries: &[(&str, &[u8])]) -> DatasetId {
    let files = write_corpus(corpus_dir, entries);
    let snap = db.snapshot();
    let task = db.allocate_task("index ...", conn(9));

    let manifest = snap
        .index_paths(&[], &BTreeSet::new(), &files, true)
        .unwrap()
        .expect("corpus is non-empty");
    task.record(DbChange::NewDataset(manifest));
    db.commit_task(task.id()).unwrap();

    let ids = db.dataset_ids();
    ids.last().cloned().expect("dataset was published")
}

#[test]
fn task_ids_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    let a = db.allocate_task("ping ;", conn(1));
    let b = db.allocate_task("ping ;", conn(2));
    assert!(a.id() < b.id());

    db.commit_task(a.id()).unwrap();
    db.commit_task(b.id()).unwrap();
    assert_eq!(db.live_tasks(), 0);
}

#[test]
fn commit_unknown_task_fails() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    assert!(db.commit_task(scour_types::TaskId::new(42)).is_err());
}

#[test]
fn config_commit_is_snapshot_isolated() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    let before = db.snapshot();
    let task = db.allocate_task("config set ...", conn(1));
    task.record(DbChange::ConfigChange(ConfigKey::Workers, "8".to_string()));

    // Not yet committed: nobody sees it.
    assert_eq!(db.snapshot().config().get(ConfigKey::Workers), 4);

    db.commit_task(task.id()).unwrap();

    // The old snapshot keeps its view; new snapshots see the change.
    assert_eq!(before.config().get(ConfigKey::Workers), 4);
    assert_eq!(db.snapshot().config().get(ConfigKey::Workers), 8);
}

#[test]
fn dataset_commit_is_snapshot_isolated() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    let before = db.snapshot();
    index_corpus(&db, dir.path(), &[("a.txt", b"needle in corpus")]);

    assert_eq!(before.datasets().len(), 0);
    assert_eq!(db.snapshot().datasets().len(), 1);
}

#[test]
fn select_finds_indexed_content() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    index_corpus(
        &db,
        dir.path(),
        &[("a.txt", b"needle in corpus"), ("b.txt", b"nothing here")],
    );

    let snap = db.snapshot();
    let mut writer = MemoryResultWriter::new();
    let stats = snap
        .execute(&Query::literal(*b"needle"), &[], &[], &mut writer)
        .unwrap();

    let files = writer.into_files();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("a.txt"));
    assert_eq!(stats.datasets_searched, 1);
    assert_eq!(stats.files_considered, 1);
}

#[test]
fn taint_toggle_updates_next_snapshot_only() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let ds = index_corpus(&db, dir.path(), &[("a.txt", b"contents here")]);

    let before = db.snapshot();
    let task = db.allocate_task("dataset taint", conn(1));
    task.record(DbChange::ToggleTaint(ds.clone(), "secret".to_string()));
    db.commit_task(task.id()).unwrap();

    assert!(!before.find_dataset(&ds).unwrap().has_taint("secret"));
    let after = db.snapshot();
    assert!(after.find_dataset(&ds).unwrap().has_taint("secret"));

    // Toggling again removes it.
    let task = db.allocate_task("dataset untaint", conn(1));
    task.record(DbChange::ToggleTaint(ds.clone(), "secret".to_string()));
    db.commit_task(task.id()).unwrap();
    assert!(!db.snapshot().find_dataset(&ds).unwrap().has_taint("secret"));
}

#[test]
fn taint_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let ds;
    {
        let db = Database::open(&data_dir).unwrap();
        ds = index_corpus(&db, dir.path(), &[("a.txt", b"contents here")]);
        let task = db.allocate_task("dataset taint", conn(1));
        task.record(DbChange::ToggleTaint(ds.clone(), "secret".to_string()));
        db.commit_task(task.id()).unwrap();
    }

    let reopened = Database::open(&data_dir).unwrap();
    let snap = reopened.snapshot();
    assert!(snap.find_dataset(&ds).unwrap().has_taint("secret"));
}

#[test]
fn dropped_dataset_survives_until_snapshots_release_it() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let ds = index_corpus(&db, dir.path(), &[("a.txt", b"needle material")]);

    // A busy worker holds a snapshot from before the drop.
    let held = db.snapshot();

    let task = db.allocate_task("dataset drop", conn(1));
    task.record(DbChange::Drop(ds.clone()));
    db.commit_task(task.id()).unwrap();

    assert!(db.snapshot().find_dataset(&ds).is_none());
    assert_eq!(db.graveyard_len(), 1);

    // GC with the old snapshot active: artifacts must survive, and the
    // old snapshot must still answer queries from them.
    db.collect_garbage(&[Arc::clone(&held)]);
    assert_eq!(db.graveyard_len(), 1);

    let mut writer = MemoryResultWriter::new();
    held.execute(&Query::literal(*b"needle"), &[], &[], &mut writer)
        .unwrap();
    assert_eq!(writer.file_count(), 1);

    // Snapshot released: artifacts go.
    let manifest = dir
        .path()
        .join("data")
        .join(format!("{ds}.manifest"));
    assert!(manifest.exists());
    db.collect_garbage(&[]);
    assert_eq!(db.graveyard_len(), 0);
    assert!(!manifest.exists());
}

#[test]
fn retired_iterator_survives_while_locked() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    // Materialize an iterator by hand, as a select would.
    let iter_id = IteratorId::new("iter_deadbeef");
    let data_path = db
        .data_dir()
        .join(DiskIterator::data_file_name(&iter_id));
    let mut writer = FileResultWriter::create(&data_path).unwrap();
    writer.push("/a").unwrap();
    let count = writer.finish().unwrap();
    DiskIterator::create(db.data_dir(), iter_id.clone(), count).unwrap();

    // A worker holds the iterator lock on its snapshot.
    let held = db.snapshot();
    held.record_locks(&[Lock::Iterator(iter_id.clone())]);

    let task = db.allocate_task("iterator pop", conn(1));
    task.record(DbChange::DropIterator(iter_id.clone()));
    db.commit_task(task.id()).unwrap();

    db.collect_garbage(&[Arc::clone(&held)]);
    assert!(data_path.exists(), "locked iterator must not be collected");

    db.collect_garbage(&[]);
    assert!(!data_path.exists());
}

#[test]
fn compact_candidates_respect_merge_limits() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    for i in 0..3 {
        let name = format!("file{i}.txt");
        index_corpus(&db, dir.path(), &[(name.as_str(), b"shared contents")]);
    }

    let snap = db.snapshot();
    let full = snap.full_compact_candidates();
    assert_eq!(full.len(), 3);

    let smart = snap.smart_compact_candidates();
    assert!(smart.len() >= 2, "similar-size datasets all qualify");

    // A single dataset is never a candidate set.
    let solo_dir = TempDir::new().unwrap();
    let solo_db = Database::open(solo_dir.path().join("data")).unwrap();
    index_corpus(&solo_db, solo_dir.path(), &[("only.txt", b"abcdefg")]);
    assert!(solo_db.snapshot().full_compact_candidates().is_empty());
}

#[test]
fn merge_through_commit_replaces_datasets() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    let a = index_corpus(&db, dir.path(), &[("a.txt", b"needle alpha")]);
    let b = index_corpus(&db, dir.path(), &[("b.txt", b"needle beta")]);

    let snap = db.snapshot();
    let task = db.allocate_task("compact all", conn(1));
    let merged = snap.merge(&[a.clone(), b.clone()]).unwrap();
    task.record(DbChange::NewDataset(merged));
    task.record(DbChange::Drop(a.clone()));
    task.record(DbChange::Drop(b.clone()));
    db.commit_task(task.id()).unwrap();

    let ids = db.dataset_ids();
    assert_eq!(ids.len(), 1);
    assert!(ids[0] != a && ids[0] != b);

    let mut writer = MemoryResultWriter::new();
    db.snapshot()
        .execute(&Query::literal(*b"needle"), &[], &[], &mut writer)
        .unwrap();
    assert_eq!(writer.file_count(), 2);
}

#[test]
fn execute_with_taint_and_dataset_filters() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();

    let tagged = index_corpus(&db, dir.path(), &[("a.txt", b"needle alpha")]);
    let plain = index_corpus(&db, dir.path(), &[("b.txt", b"needle beta")]);

    let task = db.allocate_task("dataset taint", conn(1));
    task.record(DbChange::ToggleTaint(tagged.clone(), "hot".to_string()));
    db.commit_task(task.id()).unwrap();

    let snap = db.snapshot();

    // Taint filter keeps only the tagged dataset.
    let mut writer = MemoryResultWriter::new();
    let stats = snap
        .execute(
            &Query::literal(*b"needle"),
            &["hot".to_string()],
            &[],
            &mut writer,
        )
        .unwrap();
    assert_eq!(stats.datasets_searched, 1);
    assert_eq!(writer.file_count(), 1);

    // Dataset filter restricts explicitly.
    let mut writer = MemoryResultWriter::new();
    snap.execute(&Query::literal(*b"needle"), &[], &[plain.clone()], &mut writer)
        .unwrap();
    let files = writer.into_files();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("b.txt"));

    // Unknown dataset in the filter is an error.
    let missing = DatasetId::new("set_00000000");
    let mut writer = MemoryResultWriter::new();
    assert!(snap
        .execute(&Query::literal(*b"needle"), &[], &[missing], &mut writer)
        .is_err());
}

#[test]
fn ensure_unique_skips_already_indexed_files() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let files = write_corpus(dir.path(), &[("a.txt", b"some contents")]);

    let snap = db.snapshot();
    let task = db.allocate_task("index", conn(1));
    let manifest = snap
        .index_paths(&[], &BTreeSet::new(), &files, true)
        .unwrap()
        .unwrap();
    task.record(DbChange::NewDataset(manifest));
    db.commit_task(task.id()).unwrap();

    // Same paths again, ensure-unique: nothing new.
    let snap = db.snapshot();
    assert!(snap
        .index_paths(&[], &BTreeSet::new(), &files, true)
        .unwrap()
        .is_none());

    // Force mode indexes regardless.
    assert!(snap
        .index_paths(&[], &BTreeSet::new(), &files, false)
        .unwrap()
        .is_some());
}

#[test]
fn config_default_matches_fresh_config() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    assert_eq!(*db.snapshot().config(), Config::default());
}
