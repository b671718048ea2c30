//! Concurrent writer tests for the durable store.

use std::sync::Arc;

use chrono::TimeZone;
use wavefront_core::config::RuntimeConfig;
use wavefront_core::store::{DurableStore, LockMode};
use wavefront_core::time::FixedClock;

fn test_store(root: &std::path::Path) -> DurableStore {
    let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    DurableStore::new(root, RuntimeConfig::default(), Arc::new(clock))
}

#[test]
fn ten_concurrent_appenders_serialize_cleanly() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().to_path_buf();
    std::fs::write(root.join("tasks.md"), "# Tasks\n").unwrap();

    // Ten writers race read-modify-write cycles through the locked API.
    // Every writer opens its own lock descriptor, as separate processes
    // would.
    std::thread::scope(|scope| {
        for i in 0..10 {
            let root = root.clone();
            scope.spawn(move || {
                let store = test_store(&root);
                let tasks_md = root.join("tasks.md");
                store
                    .with_lock(&tasks_md, LockMode::Exclusive, || {
                        let mut contents = store.read_to_string(&tasks_md)?;
                        contents.push_str(&format!("- [ ] TASK-{:03}: appended line\n", i + 1));
                        store.write_atomic(&tasks_md, contents.as_bytes())
                    })
                    .unwrap();
            });
        }
    });

    let contents = std::fs::read_to_string(root.join("tasks.md")).unwrap();
    let appended: Vec<&str> = contents
        .lines()
        .filter(|l| l.starts_with("- [ ] TASK-"))
        .collect();
    // Exactly ten whole lines, no interleaved bytes, no truncation.
    assert_eq!(appended.len(), 10);
    for line in appended {
        assert!(line.ends_with(": appended line"));
    }
    assert!(contents.starts_with("# Tasks\n"));
}

#[test]
fn reader_blocks_until_writer_commits() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().to_path_buf();
    let target = root.join("tasks.md");
    std::fs::write(&target, "before\n").unwrap();

    let store = test_store(&root);
    std::thread::scope(|scope| {
        let writer_root = root.clone();
        let writer = scope.spawn(move || {
            let store = test_store(&writer_root);
            let target = writer_root.join("tasks.md");
            store
                .with_lock(&target, LockMode::Exclusive, || {
                    std::thread::sleep(std::time::Duration::from_millis(150));
                    store.write_atomic(&target, b"after\n")
                })
                .unwrap();
        });

        // Give the writer time to take the lock, then read through it.
        std::thread::sleep(std::time::Duration::from_millis(50));
        let seen = store
            .with_lock(&target, LockMode::Shared, || store.read_to_string(&target))
            .unwrap();
        // The reader waited out the writer's critical section.
        assert_eq!(seen, "after\n");
        writer.join().unwrap();
    });
}
