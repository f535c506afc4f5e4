//! Mapping an origin file name to its destination under the output directory.

use std::path::{Path, PathBuf};

use crate::error::CollectorError;

/// Destination of an origin file: an optional origin directory and a basename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginPath {
    /// Directory under the output root; `None` writes to the root itself.
    pub origin: Option<String>,
    pub basename: String,
}

impl OriginPath {
    /// Derive the destination of `origin_file`.
    ///
    /// The origin is the directory segment following the last occurrence of
    /// `marker`. Without the marker, a relative name of two or more segments
    /// uses its first segment. `.`, `..` and empty values are rejected for
    /// both the origin and the basename.
    pub fn derive(origin_file: &str, marker: &str) -> Result<Self, CollectorError> {
        let segments: Vec<&str> = origin_file.split('/').collect();
        let (basename, dirs) = match segments.split_last() {
            Some((basename, dirs)) => (*basename, dirs),
            None => (origin_file, &[][..]),
        };
        check_segment(origin_file, "basename", basename)?;

        let after_marker = dirs
            .iter()
            .enumerate()
            .rev()
            .find(|(i, segment)| **segment == marker && i + 1 < dirs.len())
            .map(|(i, _)| dirs[i + 1]);

        let origin = match after_marker {
            Some(origin) => Some(origin),
            None if !origin_file.starts_with('/') && !dirs.is_empty() => Some(dirs[0]),
            None => None,
        };
        if let Some(origin) = origin {
            check_segment(origin_file, "origin segment", origin)?;
        }

        Ok(Self {
            origin: origin.map(str::to_owned),
            basename: basename.to_owned(),
        })
    }

    /// Directory the destination file lives in.
    pub fn directory(&self, output_root: &Path) -> PathBuf {
        match &self.origin {
            Some(origin) => output_root.join(origin),
            None => output_root.to_path_buf(),
        }
    }

    /// Full path of the destination file.
    pub fn destination(&self, output_root: &Path) -> PathBuf {
        self.directory(output_root).join(&self.basename)
    }
}

fn check_segment(origin_file: &str, what: &str, segment: &str) -> Result<(), CollectorError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return Err(CollectorError::InvalidOrigin {
            origin: origin_file.to_owned(),
            reason: format!("{what} '{segment}' is not a plain name"),
        });
    }
    Ok(())
}
