//! Site discovery.
//!
//! A sites root holds one subdirectory per site. Each site is scanned into a
//! [`SiteTree`] whose file order is stable across runs: entries sorted by
//! name, files before subdirectories.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::publisher::PublishError;

/// File name of the entry document, matched case-insensitively.
pub const ENTRY_DOCUMENT: &str = "index.html";

/// A file inside a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the site root, `/`-separated.
    pub relative_path: String,
    /// Extension without the leading dot (empty if none).
    pub extension: String,
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
}

impl SourceFile {
    /// Last path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        sitepush_assets::file_name(&self.relative_path)
    }
}

/// A scanned site directory.
#[derive(Debug, Clone)]
pub struct SiteTree {
    /// Site name (the directory name).
    pub name: String,
    /// Site root directory.
    pub root: PathBuf,
    /// Files in discovery order.
    pub files: Vec<SourceFile>,
    /// Names of the directories directly under the root.
    pub directories: BTreeSet<String>,
}

impl SiteTree {
    /// Scan a site directory.
    pub fn scan(root: &Path) -> Result<Self, PublishError> {
        if !root.is_dir() {
            return Err(PublishError::SiteNotFound(root.to_path_buf()));
        }
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = Vec::new();
        let mut directories = BTreeSet::new();
        walk_dir(root, "", &mut files, &mut directories).map_err(|source| PublishError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        Ok(Self {
            name,
            root: root.to_path_buf(),
            files,
            directories,
        })
    }

    /// The entry document: the first file named `index.html`, any case.
    #[must_use]
    pub fn entry_document(&self) -> Option<&SourceFile> {
        self.files
            .iter()
            .find(|f| f.file_name().eq_ignore_ascii_case(ENTRY_DOCUMENT))
    }
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

fn walk_dir(
    current: &Path,
    prefix: &str,
    files: &mut Vec<SourceFile>,
    directories: &mut BTreeSet<String>,
) -> io::Result<()> {
    let mut subdirs = Vec::new();
    for entry in sorted_entries(current)? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            subdirs.push((name, path));
            continue;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(SourceFile {
            relative_path: format!("{prefix}{name}"),
            extension,
            absolute_path: path,
        });
    }

    for (name, path) in subdirs {
        if prefix.is_empty() {
            directories.insert(name.clone());
        }
        walk_dir(&path, &format!("{prefix}{name}/"), files, directories)?;
    }
    Ok(())
}

/// List site directories under `sites_dir`, sorted by name.
///
/// Plain files at the root are ignored.
pub fn discover_sites(sites_dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    if !sites_dir.is_dir() {
        return Err(PublishError::SiteNotFound(sites_dir.to_path_buf()));
    }
    let entries = sorted_entries(sites_dir).map_err(|source| PublishError::Io {
        path: sites_dir.to_path_buf(),
        source,
    })?;
    Ok(entries
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect())
}
