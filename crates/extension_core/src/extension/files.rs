//! File-access boundary used by extension discovery and startup.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};

/// Thin filesystem contract consumed by [`crate::Finder`] and
/// [`crate::Environment`].
pub trait FileAccess {
    /// Expands one glob pattern. Failed expansion yields no matches.
    fn glob(&self, pattern: &str) -> Vec<PathBuf>;
    fn is_file(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Local disk implementation backed by the `glob` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileAccess;

impl LocalFileAccess {
    pub fn new() -> Self {
        Self
    }
}

impl FileAccess for LocalFileAccess {
    fn glob(&self, pattern: &str) -> Vec<PathBuf> {
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(
                    "event=glob_expand module=files status=skip pattern={} error={}",
                    pattern, err
                );
                return vec![];
            }
        };

        // Unreadable entries count as zero matches; sort for stable detection order.
        let mut matches: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        matches.sort();
        matches
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}
