//! File discovery and per-file tracking state.
//!
//! [`FileTracker::discover`] walks the watch directory and returns every
//! regular file whose basename matches the include pattern and does not match
//! the exclude pattern. Directories whose basename is listed in
//! `excluded_dirs` are pruned together with their whole subtree. The root
//! itself is never pruned.
//!
//! [`TrackedFiles`] holds one [`TrackedFile`] per path, ordered by path. New
//! candidates are added with a zero cursor; existing entries are never
//! replaced, so a file's cursor survives across ticks.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use regex::Regex;
use walkdir::WalkDir;

use crate::config::{AgentSettings, compile_pattern};
use crate::error::AgentError;

/// Tracking state for one discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Absolute (or root-joined) path of the file.
    pub path: PathBuf,
    /// Cursor of the last extraction; `0` means never extracted.
    pub last_cursor: u64,
    /// Output of the last extraction.
    pub last_payload: Bytes,
}

impl TrackedFile {
    /// A file that has not been extracted yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_cursor: 0,
            last_payload: Bytes::new(),
        }
    }

    /// `true` until the first successful extraction.
    pub fn is_new(&self) -> bool {
        self.last_cursor == 0
    }
}

/// The set of tracked files, keyed and ordered by path.
#[derive(Debug, Default)]
pub struct TrackedFiles {
    files: BTreeMap<PathBuf, TrackedFile>,
}

impl TrackedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking every candidate not tracked yet. Returns how many were added.
    pub fn reconcile(&mut self, candidates: impl IntoIterator<Item = PathBuf>) -> usize {
        let mut added = 0;
        for path in candidates {
            if !self.files.contains_key(&path) {
                tracing::debug!(path = %path.display(), "tracking new file");
                self.files.insert(path.clone(), TrackedFile::new(path));
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedFile> {
        self.files.values_mut()
    }

    /// Drop a file from tracking.
    pub fn remove(&mut self, path: &Path) -> Option<TrackedFile> {
        self.files.remove(path)
    }

    /// Tracked paths in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }
}

/// Finds candidate files under the watch directory.
///
/// Cloning is cheap; compiled regexes share their program.
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
    include: Regex,
    exclude: Option<Regex>,
    excluded_dirs: HashSet<String>,
}

impl FileTracker {
    /// Compile the patterns. `exclude` of `None` excludes nothing.
    pub fn new(
        root: impl Into<PathBuf>,
        include: &str,
        exclude: Option<&str>,
        excluded_dirs: &[String],
    ) -> Result<Self, AgentError> {
        let include = compile_pattern("include_pattern", include)?;
        let exclude = exclude
            .map(|p| compile_pattern("exclude_pattern", p))
            .transpose()?;

        Ok(Self {
            root: root.into(),
            include,
            exclude,
            excluded_dirs: excluded_dirs.iter().cloned().collect(),
        })
    }

    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AgentError> {
        Self::new(
            settings.watch_dir.clone(),
            &settings.include_pattern,
            settings.exclude_pattern.as_deref(),
            &settings.excluded_dirs,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `true` if a file with this basename should be tracked.
    pub fn is_candidate(&self, basename: &str) -> bool {
        self.include.is_match(basename)
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(basename))
    }

    /// Walk the watch directory.
    ///
    /// Blocking; call from `spawn_blocking`. Unreadable entries are logged
    /// and skipped. A missing root yields an empty set.
    pub fn discover(&self) -> BTreeSet<PathBuf> {
        let mut found = BTreeSet::new();

        if !self.root.is_dir() {
            tracing::warn!(root = %self.root.display(), "watch directory does not exist");
            return found;
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self
                        .excluded_dirs
                        .contains(entry.file_name().to_string_lossy().as_ref())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.is_candidate(&entry.file_name().to_string_lossy()) {
                found.insert(entry.into_path());
            }
        }

        tracing::debug!(root = %self.root.display(), count = found.len(), "discovery finished");
        found
    }

    /// Path of `path` relative to the watch directory, `/`-separated.
    ///
    /// Falls back to the full path when `path` is outside the root.
    pub fn relative_name(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            _ => path.to_string_lossy().into_owned(),
        }
    }
}
