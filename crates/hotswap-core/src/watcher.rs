//! Polling directory watcher
//!
//! A dedicated thread snapshots (modified time, length) for every file with
//! the unit extension anywhere below the watched directory and hands created
//! or modified files to a sink. Files
//! present when the watcher starts form the baseline and are not reported.

use crate::config::HotSwapConfig;
use crate::error::WatchError;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Receives the content of created or modified unit files
pub trait UnitSink: Send + 'static {
    /// Handle one file
    fn accept(&mut self, path: &Path, bytes: Vec<u8>);
}

impl<F> UnitSink for F
where
    F: FnMut(&Path, Vec<u8>) + Send + 'static,
{
    fn accept(&mut self, path: &Path, bytes: Vec<u8>) {
        self(path, bytes);
    }
}

/// Files at any depth under `dir` whose name ends with `extension`, sorted
///
/// Ignore files and hidden-file rules are not applied: compiled output
/// usually lives in directories a VCS ignores.
#[must_use]
pub fn unit_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir).standard_filters(false).follow_links(false).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("cannot walk {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if entry.file_name().to_str().is_some_and(|n| n.ends_with(extension)) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

/// Kind of change seen in one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Change {
    /// File appeared
    Created,
    /// Modified time or length changed
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Snapshot of the watched files
#[derive(Debug, Default)]
struct Snapshot {
    files: HashMap<PathBuf, Stamp>,
}

impl Snapshot {
    fn scan(dir: &Path, extension: &str) -> Self {
        let mut files = HashMap::new();
        for path in unit_files(dir, extension) {
            match std::fs::metadata(&path) {
                Ok(meta) => {
                    files.insert(
                        path,
                        Stamp {
                            modified: meta.modified().ok(),
                            len: meta.len(),
                        },
                    );
                }
                Err(e) => tracing::debug!("skipping {}: {}", path.display(), e),
            }
        }
        Self { files }
    }

    fn changes_since(&self, previous: &Snapshot) -> Vec<(PathBuf, Change)> {
        let mut changes: Vec<(PathBuf, Change)> = self
            .files
            .iter()
            .filter_map(|(path, stamp)| match previous.files.get(path) {
                None => Some((path.clone(), Change::Created)),
                Some(old) if old != stamp => Some((path.clone(), Change::Modified)),
                Some(_) => None,
            })
            .collect();
        changes.sort();
        changes
    }
}

/// Polls a directory for unit files
#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    dir: PathBuf,
    extension: String,
    interval: Duration,
}

impl DirectoryWatcher {
    /// Watcher over `dir` for files ending in `extension`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            interval,
        }
    }

    /// Watcher configured from `config`
    #[must_use]
    pub fn from_config(config: &HotSwapConfig) -> Self {
        Self::new(&config.watch_dir, &config.unit_extension, config.poll_interval())
    }

    /// Watched directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start the monitor thread
    ///
    /// # Errors
    /// Returns error if the directory does not exist or the thread cannot
    /// be spawned
    pub fn spawn(self, mut sink: impl UnitSink) -> Result<WatchHandle, WatchError> {
        if !self.dir.is_dir() {
            return Err(WatchError::NotADirectory(self.dir));
        }
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let mut previous = Snapshot::scan(&self.dir, &self.extension);
        tracing::info!("monitoring {} every {:?}", self.dir.display(), self.interval);

        let thread = std::thread::Builder::new()
            .name("hotswap-watcher".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(self.interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!("watcher for {} stopped", self.dir.display());
                        break;
                    }
                }
                let current = Snapshot::scan(&self.dir, &self.extension);
                for (path, change) in current.changes_since(&previous) {
                    tracing::debug!("{:?}: {}", change, path.display());
                    match std::fs::read(&path) {
                        Ok(bytes) => sink.accept(&path, bytes),
                        Err(e) => tracing::warn!("cannot read {}: {}", path.display(), e),
                    }
                }
                previous = current;
            })
            .map_err(WatchError::Spawn)?;

        Ok(WatchHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Running watcher; stops when dropped
#[derive(Debug)]
pub struct WatchHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("watcher thread panicked");
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
