//! Directory watcher feeding the engine

use crossbeam::channel;
use hotswap_bytecode::{encode, FieldNode, UnitNode};
use hotswap_core::{DirectoryWatcher, HotSwapEngine, HotSwapConfig, SandboxRuntime, SwapOutcome};
use hotswap_registry::GenerationRegistry;
use hotswap_test_utils::{default_init, OBJECT};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn unit(fields: usize) -> Vec<u8> {
    let mut u = UnitNode::new("demo/Widget", Some(OBJECT.to_string()));
    u.methods.push(default_init(OBJECT));
    for i in 0..fields {
        u.fields.push(FieldNode::new(0, format!("f{i}"), "I"));
    }
    encode(&u).unwrap()
}

#[test]
fn created_and_modified_files_are_delivered() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("existing.unit"), b"baseline").unwrap();

    let (tx, rx) = channel::unbounded::<(PathBuf, Vec<u8>)>();
    let watcher = DirectoryWatcher::new(dir.path(), ".unit", Duration::from_millis(20));
    let handle = watcher
        .spawn(move |path: &Path, bytes: Vec<u8>| {
            let _ = tx.send((path.to_path_buf(), bytes));
        })
        .unwrap();

    let path = dir.path().join("Widget.unit");
    std::fs::write(&path, b"one").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    let (seen, bytes) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, path);
    assert_eq!(bytes, b"one");

    std::fs::write(&path, b"one-two").unwrap();
    let (seen, bytes) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(seen, path);
    assert_eq!(bytes, b"one-two");

    handle.stop();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn units_in_package_directories_are_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = channel::unbounded::<PathBuf>();
    let handle = DirectoryWatcher::new(dir.path(), ".unit", Duration::from_millis(20))
        .spawn(move |path: &Path, _: Vec<u8>| {
            let _ = tx.send(path.to_path_buf());
        })
        .unwrap();

    let pkg = dir.path().join("demo").join("pkg");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(pkg.join("Widget.unit"), b"nested").unwrap();
    std::fs::write(dir.path().join("Top.unit"), b"top").unwrap();

    let mut seen = BTreeSet::new();
    while seen.len() < 2 {
        seen.insert(rx.recv_timeout(WAIT).unwrap());
    }
    assert_eq!(
        seen.into_iter().collect::<Vec<_>>(),
        vec![dir.path().join("Top.unit"), pkg.join("Widget.unit")]
    );
    handle.stop();
}

#[test]
fn watched_changes_are_swapped() {
    let dir = tempfile::tempdir().unwrap();
    let config = HotSwapConfig::default()
        .with_watch_dir(dir.path())
        .with_poll_interval(Duration::from_millis(20));

    let registry = Arc::new(GenerationRegistry::new());
    let runtime = Arc::new(SandboxRuntime::new(Arc::clone(&registry)));
    runtime.primary().load_unit(&unit(0)).unwrap();
    let engine = Arc::new(HotSwapEngine::new(runtime, Arc::clone(&registry)).with_config(&config));

    let (tx, rx) = channel::unbounded();
    let sink_engine = Arc::clone(&engine);
    let handle = DirectoryWatcher::from_config(&config)
        .spawn(move |_: &Path, bytes: Vec<u8>| {
            let _ = tx.send(sink_engine.submit(&bytes));
        })
        .unwrap();

    std::fs::write(dir.path().join("Widget.unit"), unit(2)).unwrap();
    let outcome = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert!(matches!(outcome, SwapOutcome::Overridden { generation: 0, .. }));
    assert_eq!(registry.get("demo/Widget").unwrap().internal_name(), "demo/Widget$HCR$0");

    handle.stop();
    assert_eq!(engine.stats().overridden, 1);
}
