use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use crossbeam::channel::Sender;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::database::{EntryKind, LocalEntry};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Leave out dot-files and dot-directories below the root.
    pub skip_hidden: bool,
    pub follow_links: bool,
}

/// Walks `root` (itself included) and sends one entry per file or directory.
/// Returns how many entries were sent.
pub fn scan_directory(root: &Path, options: &ScanOptions, tx: Sender<LocalEntry>) -> Result<usize> {
    let walker = WalkDir::new(root).follow_links(options.follow_links).into_iter();
    let mut sent = 0;

    for entry in walker.filter_entry(|e| e.depth() == 0 || !options.skip_hidden || !is_hidden(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Skipping {:?}: {}", entry.path(), err);
                continue;
            }
        };

        let kind = if metadata.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        let record = LocalEntry {
            path: entry.path().to_string_lossy().into_owned(),
            kind,
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            mtime: metadata.modified().map(unix_seconds).unwrap_or(0),
        };

        // Receiver gone means nobody wants the rest of the walk.
        if tx.send(record).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name()
         .to_str()
         .map(|s| s.starts_with('.'))
         .unwrap_or(false)
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(err) => -i64::try_from(err.duration().as_secs()).unwrap_or(i64::MAX),
    }
}
