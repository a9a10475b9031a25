//! Cache-busting asset names and entry document rewriting.
//!
//! The pipeline for a single site is:
//!
//! 1. [`hash_file`] fingerprints the bytes of every CSS/JS file
//! 2. [`name_asset`] turns each source path into an [`AssetRecord`] with its
//!    final object name
//! 3. The records are collected into a [`RenameMap`], which refuses two source
//!    files that would be stored under the same object name
//! 4. [`rewrite`] updates the entry document so it references the renamed
//!    assets and no longer uses root-absolute paths
//!
//! Nothing in this crate talks to object storage.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use sitepush_assets::{RenameMap, RewriteScope, rewrite};
//!
//! let mut map = RenameMap::new();
//! map.insert("style.css", "style-1a2b3c4d.css").unwrap();
//! let dirs = BTreeSet::from(["img".to_owned()]);
//!
//! let html = r#"<link href="style.css"><img src="/img/a.png">"#;
//! let out = rewrite(html, &map, &dirs, RewriteScope::Literal);
//! assert_eq!(out, r#"<link href="style-1a2b3c4d.css"><img src="./img/a.png">"#);
//! ```

mod content_type;
mod hash;
mod namer;
mod rewrite;

pub use content_type::content_type_for;
pub use hash::{ContentToken, TOKEN_LEN, hash_bytes, hash_file};
pub use namer::{AssetRecord, NameCollision, RenameMap, is_cache_busted, name_asset, object_name};
pub use rewrite::{RewriteScope, file_name, relocalize, rewrite, substitute_filenames};
