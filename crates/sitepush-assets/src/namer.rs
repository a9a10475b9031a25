//! Final object names for site files.
//!
//! CSS and JS files get a content token spliced into their file name
//! (`css/site.css` -> `css/site-1a2b3c4d.css`). Every other file keeps its
//! relative path.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use crate::content_type::content_type_for;
use crate::hash::{ContentToken, hash_file};

/// Naming decision for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Path relative to the site root, as discovered.
    pub original_path: String,
    /// Object name the file is stored under.
    pub object_name: String,
    /// Content-Type sent with the upload.
    pub content_type: &'static str,
    /// True when the object name carries a content token.
    pub cache_busted: bool,
}

/// Split a file name into stem and extension (with its leading dot).
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) => file_name.split_at(idx),
        None => (file_name, ""),
    }
}

/// Check whether a path names a CSS or JS file.
#[must_use]
pub fn is_cache_busted(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (_, ext) = split_extension(file_name);
    ext.eq_ignore_ascii_case(".css") || ext.eq_ignore_ascii_case(".js")
}

/// Compute the object name for a relative path.
///
/// With a token, the token is inserted between the file stem and its
/// extension, keeping the file in its directory. Without one, the path is
/// returned with separators normalized to `/`.
#[must_use]
pub fn object_name(relative_path: &str, token: Option<&ContentToken>) -> String {
    let normalized = relative_path.replace('\\', "/");
    let Some(token) = token else {
        return normalized;
    };

    let (dir_prefix, file_name) = match normalized.rfind('/') {
        Some(idx) => normalized.split_at(idx + 1),
        None => ("", normalized.as_str()),
    };
    let (stem, ext) = split_extension(file_name);
    format!("{dir_prefix}{stem}-{token}{ext}")
}

/// Build the [`AssetRecord`] for a file, hashing it only when cache-busted.
pub fn name_asset(relative_path: &str, absolute_path: &Path) -> io::Result<AssetRecord> {
    let cache_busted = is_cache_busted(relative_path);
    let token = if cache_busted {
        Some(hash_file(absolute_path)?)
    } else {
        None
    };
    Ok(AssetRecord {
        original_path: relative_path.to_owned(),
        object_name: object_name(relative_path, token.as_ref()),
        content_type: content_type_for(relative_path),
        cache_busted,
    })
}

/// Two different source files would be stored under the same object name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("object name {object_name} is produced by both {first} and {second}")]
pub struct NameCollision {
    /// The contested object name.
    pub object_name: String,
    /// Source path that claimed the name first.
    pub first: String,
    /// Source path that tried to claim it second.
    pub second: String,
}

/// Mapping from original relative path to final object name.
///
/// Covers every file of a site, unchanged names included. Iteration is
/// ordered by original path.
#[derive(Debug, Default, Clone)]
pub struct RenameMap {
    entries: BTreeMap<String, String>,
    owners: HashMap<String, String>,
}

impl RenameMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from naming records.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a AssetRecord>,
    ) -> Result<Self, NameCollision> {
        let mut map = Self::new();
        for record in records {
            map.insert(&record.original_path, &record.object_name)?;
        }
        Ok(map)
    }

    /// Record that `original` is stored as `object_name`.
    ///
    /// Fails if another original path already owns `object_name`.
    pub fn insert(&mut self, original: &str, object_name: &str) -> Result<(), NameCollision> {
        if let Some(owner) = self.owners.get(object_name)
            && owner != original
        {
            return Err(NameCollision {
                object_name: object_name.to_owned(),
                first: owner.clone(),
                second: original.to_owned(),
            });
        }
        if let Some(previous) = self
            .entries
            .insert(original.to_owned(), object_name.to_owned())
        {
            self.owners.remove(&previous);
        }
        self.owners
            .insert(object_name.to_owned(), original.to_owned());
        Ok(())
    }

    /// Look up the object name for an original path.
    #[must_use]
    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    /// Iterate all `(original, object_name)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(original, name)| (original.as_str(), name.as_str()))
    }

    /// Iterate the pairs whose object name differs from the original path.
    pub fn renamed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(original, name)| original != name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hash::hash_bytes;

    fn token(s: &str) -> ContentToken {
        hash_bytes(s.as_bytes())
    }

    #[test]
    fn test_object_name_nested_css() {
        let t = token("a");
        assert_eq!(
            object_name("a/b/style.css", Some(&t)),
            format!("a/b/style-{t}.css")
        );
    }

    #[test]
    fn test_object_name_root_js() {
        let t = token("b");
        assert_eq!(object_name("main.js", Some(&t)), format!("main-{t}.js"));
    }

    #[test]
    fn test_object_name_without_token_is_identity() {
        assert_eq!(object_name("a/b/app.png", None), "a/b/app.png");
    }

    #[test]
    fn test_object_name_normalizes_separators() {
        assert_eq!(object_name("a\\b\\app.png", None), "a/b/app.png");
        let t = token("c");
        assert_eq!(
            object_name("a\\site.css", Some(&t)),
            format!("a/site-{t}.css")
        );
    }

    #[test]
    fn test_object_name_keeps_extension_case() {
        let t = token("d");
        assert_eq!(object_name("Theme.CSS", Some(&t)), format!("Theme-{t}.CSS"));
    }

    #[test]
    fn test_object_name_multiple_dots() {
        let t = token("e");
        assert_eq!(
            object_name("js/vendor.min.js", Some(&t)),
            format!("js/vendor.min-{t}.js")
        );
    }

    #[test]
    fn test_is_cache_busted() {
        assert!(is_cache_busted("style.css"));
        assert!(is_cache_busted("js/app.JS"));
        assert!(!is_cache_busted("index.html"));
        assert!(!is_cache_busted("data.json"));
        assert!(!is_cache_busted("css.d/readme"));
        assert!(!is_cache_busted("app.jsx"));
    }

    #[test]
    fn test_name_asset_busts_css() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("style.css");
        std::fs::write(&path, "body{}").unwrap();

        let record = name_asset("css/style.css", &path).unwrap();
        let t = hash_bytes(b"body{}");
        assert_eq!(
            record,
            AssetRecord {
                original_path: "css/style.css".to_owned(),
                object_name: format!("css/style-{t}.css"),
                content_type: "text/css",
                cache_busted: true,
            }
        );
    }

    #[test]
    fn test_name_asset_keeps_png() {
        // The file is never opened for non-busted assets
        let record = name_asset("img/logo.png", Path::new("/does/not/exist.png")).unwrap();
        assert_eq!(record.object_name, "img/logo.png");
        assert_eq!(record.content_type, "image/png");
        assert!(!record.cache_busted);
    }

    #[test]
    fn test_name_asset_unreadable_css_fails() {
        let err = name_asset("style.css", Path::new("/does/not/exist.css")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_same_basename_in_different_dirs() {
        let t = token("same");
        let a = object_name("a/app.js", Some(&t));
        let b = object_name("b/app.js", Some(&t));
        assert_ne!(a, b);

        let mut map = RenameMap::new();
        map.insert("a/app.js", &a).unwrap();
        map.insert("b/app.js", &b).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_rename_map_detects_collision() {
        let mut map = RenameMap::new();
        map.insert("style-1a2b3c4d.css", "style-1a2b3c4d.css")
            .unwrap();
        let err = map
            .insert("style.css", "style-1a2b3c4d.css")
            .unwrap_err();
        assert_eq!(
            err,
            NameCollision {
                object_name: "style-1a2b3c4d.css".to_owned(),
                first: "style-1a2b3c4d.css".to_owned(),
                second: "style.css".to_owned(),
            }
        );
        assert!(err.to_string().contains("style.css"));
    }

    #[test]
    fn test_rename_map_reinsert_same_pair() {
        let mut map = RenameMap::new();
        map.insert("a.js", "a-00000000.js").unwrap();
        map.insert("a.js", "a-00000000.js").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a.js"), Some("a-00000000.js"));
    }

    #[test]
    fn test_rename_map_renamed_skips_identity() {
        let mut map = RenameMap::new();
        map.insert("logo.png", "logo.png").unwrap();
        map.insert("main.js", "main-12345678.js").unwrap();
        let renamed: Vec<_> = map.renamed().collect();
        assert_eq!(renamed, vec![("main.js", "main-12345678.js")]);
    }
}
