//! Entry document rewriting.
//!
//! Two passes run over the HTML text, in order:
//!
//! 1. **Filename substitution**: bare file names of renamed assets are replaced
//!    with their cache-busted names.
//! 2. **Relocalization**: root-absolute references into top-level site
//!    directories (`"/assets/..."`) become document-relative (`"./assets/..."`),
//!    so the bundle also works when served from a sub-path.
//!
//! Both passes are plain text transforms with no I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::namer::RenameMap;

/// Quoted attribute values and CSS `url(...)` arguments.
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"=\s*"([^"]*)"|=\s*'([^']*)'|url\(\s*([^)]*?)\s*\)"#)
        .expect("invalid reference regex")
});

/// CSS `url(...)` arguments inside an attribute value (e.g. `style="..."`).
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"url\(\s*([^)]*?)\s*\)").expect("invalid url regex"));

/// Where filename substitution is allowed to touch the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteScope {
    /// Replace every occurrence of an original file name anywhere in the text.
    #[default]
    Literal,
    /// Replace file names only inside quoted attribute values and `url(...)`,
    /// and only when they form a whole path segment.
    References,
}

/// Last `/`-separated segment of a path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Run both rewrite passes over an entry document.
#[must_use]
pub fn rewrite(
    html: &str,
    renames: &RenameMap,
    directories: &BTreeSet<String>,
    scope: RewriteScope,
) -> String {
    let substituted = substitute_filenames(html, renames, scope);
    relocalize(&substituted, directories)
}

/// Replace original asset file names with their final names.
#[must_use]
pub fn substitute_filenames(html: &str, renames: &RenameMap, scope: RewriteScope) -> String {
    match scope {
        RewriteScope::Literal => substitute_literal(html, renames),
        RewriteScope::References => substitute_references(html, renames),
    }
}

fn substitute_literal(html: &str, renames: &RenameMap) -> String {
    // Longest names first so `app.js` cannot eat into `webapp.js`
    let mut pairs: Vec<(&str, &str)> = renames
        .renamed()
        .map(|(original, name)| (file_name(original), file_name(name)))
        .collect();
    pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut text = html.to_owned();
    for (from, to) in pairs {
        if from.is_empty() || from == to {
            continue;
        }
        text = text.replace(from, to);
    }
    text
}

/// Renamed assets grouped by their original file name.
struct Candidates<'a> {
    by_name: BTreeMap<&'a str, Vec<(&'a str, &'a str)>>,
}

impl<'a> Candidates<'a> {
    fn new(renames: &'a RenameMap) -> Self {
        let mut by_name: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
        for (original, name) in renames.renamed() {
            by_name
                .entry(file_name(original))
                .or_default()
                .push((original, file_name(name)));
        }
        Self { by_name }
    }

    /// Final file name for a reference path, if it points at a renamed asset.
    fn resolve(&self, path: &str) -> Option<&'a str> {
        let candidates = self.by_name.get(file_name(path))?;
        let normalized = path.trim_start_matches("./").trim_start_matches('/');
        let matching = candidates
            .iter()
            .find(|(original, _)| is_segment_suffix(normalized, original))
            .or_else(|| candidates.first())?;
        Some(matching.1)
    }
}

/// True if `suffix` equals `path` or ends it at a segment boundary.
fn is_segment_suffix(path: &str, suffix: &str) -> bool {
    path == suffix
        || path
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('/'))
}

fn substitute_references(html: &str, renames: &RenameMap) -> String {
    let candidates = Candidates::new(renames);
    if candidates.by_name.is_empty() {
        return html.to_owned();
    }

    REFERENCE_PATTERN
        .replace_all(html, |caps: &Captures| {
            let whole = caps.get_match();
            let (value, rewritten) = if let Some(url) = caps.get(3) {
                (url, rewrite_url_argument(url.as_str(), &candidates))
            } else if let Some(value) = caps.get(1).or_else(|| caps.get(2)) {
                (value, rewrite_attribute(value.as_str(), &candidates))
            } else {
                return whole.as_str().to_owned();
            };
            let start = value.start() - whole.start();
            let end = value.end() - whole.start();
            let text = whole.as_str();
            format!("{}{}{}", &text[..start], rewritten, &text[end..])
        })
        .into_owned()
}

fn rewrite_attribute(value: &str, candidates: &Candidates<'_>) -> String {
    if value.contains("url(") {
        return URL_PATTERN
            .replace_all(value, |caps: &Captures| {
                let whole = caps.get_match();
                let Some(arg) = caps.get(1) else {
                    return whole.as_str().to_owned();
                };
                let start = arg.start() - whole.start();
                let end = arg.end() - whole.start();
                let text = whole.as_str();
                format!(
                    "{}{}{}",
                    &text[..start],
                    rewrite_url_argument(arg.as_str(), candidates),
                    &text[end..]
                )
            })
            .into_owned();
    }
    let trimmed = value.trim();
    match rewrite_reference(trimmed, candidates) {
        Some(rewritten) => value.replacen(trimmed, &rewritten, 1),
        None => value.to_owned(),
    }
}

fn rewrite_url_argument(arg: &str, candidates: &Candidates<'_>) -> String {
    let quote = arg
        .chars()
        .next()
        .filter(|c| (*c == '"' || *c == '\'') && arg.len() >= 2 && arg.ends_with(*c));
    let inner = match quote {
        Some(_) => &arg[1..arg.len() - 1],
        None => arg,
    };
    match (rewrite_reference(inner, candidates), quote) {
        (Some(rewritten), Some(q)) => format!("{q}{rewritten}{q}"),
        (Some(rewritten), None) => rewritten,
        (None, _) => arg.to_owned(),
    }
}

/// Rewrite a single URL reference, keeping any query string or fragment.
fn rewrite_reference(reference: &str, candidates: &Candidates<'_>) -> Option<String> {
    if reference.contains("://") || reference.starts_with("//") || reference.starts_with("data:")
    {
        return None;
    }
    let split = reference.find(['?', '#']).unwrap_or(reference.len());
    let (path, suffix) = reference.split_at(split);
    let new_name = candidates.resolve(path)?;
    let dir_len = path.len() - file_name(path).len();
    Some(format!("{}{new_name}{suffix}", &path[..dir_len]))
}

/// Turn root-absolute references into top-level directories into relative ones.
///
/// For each directory `d`, `/d` becomes `./d` when it is directly preceded by
/// a quote or whitespace and directly followed by `/`, a quote, or whitespace.
#[must_use]
pub fn relocalize(html: &str, directories: &BTreeSet<String>) -> String {
    let mut text = html.to_owned();
    for dir in directories {
        if dir.is_empty() {
            continue;
        }
        text = relocalize_directory(&text, dir);
    }
    text
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

fn relocalize_directory(text: &str, dir: &str) -> String {
    let needle = format!("/{dir}");
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (idx, _) in text.match_indices(&needle) {
        let end = idx + needle.len();
        let before = text[..idx].chars().next_back();
        let after = text[end..].chars().next();
        let anchored_before = before.is_some_and(|c| is_quote(c) || c.is_whitespace());
        let anchored_after = after.is_some_and(|c| c == '/' || is_quote(c) || c.is_whitespace());
        if anchored_before && anchored_after {
            out.push_str(&text[last..idx]);
            out.push('.');
            out.push_str(&needle);
            last = end;
        }
    }

    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn renames(pairs: &[(&str, &str)]) -> RenameMap {
        let mut map = RenameMap::new();
        for (original, name) in pairs {
            map.insert(original, name).unwrap();
        }
        map
    }

    fn dirs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[test]
    fn test_literal_replaces_link() {
        let map = renames(&[("style.css", "style-1a2b3c4d.css")]);
        let out = rewrite(
            r#"<link href="style.css">"#,
            &map,
            &BTreeSet::new(),
            RewriteScope::Literal,
        );
        assert_eq!(out, r#"<link href="style-1a2b3c4d.css">"#);
        assert!(!out.replace("style-1a2b3c4d.css", "").contains("style.css"));
    }

    #[test]
    fn test_literal_uses_bare_file_names() {
        let map = renames(&[("js/main.js", "js/main-deadbeef.js")]);
        let out = substitute_filenames(
            r#"<script src="js/main.js"></script>"#,
            &map,
            RewriteScope::Literal,
        );
        assert_eq!(out, r#"<script src="js/main-deadbeef.js"></script>"#);
    }

    #[test]
    fn test_literal_replaces_every_occurrence() {
        let map = renames(&[("app.js", "app-00ff00ff.js")]);
        let out = substitute_filenames(
            "<script src=app.js></script><!-- app.js -->",
            &map,
            RewriteScope::Literal,
        );
        assert_eq!(
            out,
            "<script src=app-00ff00ff.js></script><!-- app-00ff00ff.js -->"
        );
    }

    #[test]
    fn test_literal_skips_identity_entries() {
        let map = renames(&[("logo.png", "logo.png"), ("index.html", "index.html")]);
        let html = r#"<img src="logo.png">"#;
        assert_eq!(substitute_filenames(html, &map, RewriteScope::Literal), html);
    }

    #[test]
    fn test_literal_longest_name_first() {
        let map = renames(&[("app.js", "app-11111111.js"), ("webapp.js", "webapp-22222222.js")]);
        let out = substitute_filenames(
            r#"<script src="webapp.js"></script><script src="app.js"></script>"#,
            &map,
            RewriteScope::Literal,
        );
        assert_eq!(
            out,
            r#"<script src="webapp-22222222.js"></script><script src="app-11111111.js"></script>"#
        );
    }

    #[test]
    fn test_literal_touches_plain_text() {
        let map = renames(&[("main.js", "main-abcdef01.js")]);
        let out = substitute_filenames("<p>Edit main.js to start</p>", &map, RewriteScope::Literal);
        assert_eq!(out, "<p>Edit main-abcdef01.js to start</p>");
    }

    #[test]
    fn test_references_leave_plain_text_alone() {
        let map = renames(&[("main.js", "main-abcdef01.js")]);
        let html = r#"<p>Edit main.js to start</p><script src="main.js"></script>"#;
        let out = substitute_filenames(html, &map, RewriteScope::References);
        assert_eq!(
            out,
            r#"<p>Edit main.js to start</p><script src="main-abcdef01.js"></script>"#
        );
    }

    #[test]
    fn test_references_require_whole_segment() {
        let map = renames(&[("app.js", "app-11111111.js")]);
        let html = r#"<script src="webapp.js"></script><script src='./app.js'></script>"#;
        let out = substitute_filenames(html, &map, RewriteScope::References);
        assert_eq!(
            out,
            r#"<script src="webapp.js"></script><script src='./app-11111111.js'></script>"#
        );
    }

    #[test]
    fn test_references_keep_query_and_fragment() {
        let map = renames(&[("css/site.css", "css/site-0a0b0c0d.css")]);
        let html = r#"<link href="/css/site.css?v=2#top">"#;
        let out = substitute_filenames(html, &map, RewriteScope::References);
        assert_eq!(out, r#"<link href="/css/site-0a0b0c0d.css?v=2#top">"#);
    }

    #[test]
    fn test_references_pick_matching_directory() {
        let map = renames(&[
            ("a/app.js", "a/app-aaaaaaaa.js"),
            ("b/app.js", "b/app-bbbbbbbb.js"),
        ]);
        let html = r#"<script src="a/app.js"></script><script src="b/app.js"></script>"#;
        let out = substitute_filenames(html, &map, RewriteScope::References);
        assert_eq!(
            out,
            r#"<script src="a/app-aaaaaaaa.js"></script><script src="b/app-bbbbbbbb.js"></script>"#
        );
    }

    #[test]
    fn test_references_css_url() {
        let map = renames(&[("fonts.css", "fonts-12121212.css")]);
        let html = concat!(
            "<style>@import url(\"fonts.css\");</style>",
            "<div style=\"background: url('fonts.css')\"></div>",
            "<style>@import url( fonts.css );</style>",
        );
        let out = substitute_filenames(html, &map, RewriteScope::References);
        assert_eq!(
            out,
            concat!(
                "<style>@import url(\"fonts-12121212.css\");</style>",
                "<div style=\"background: url('fonts-12121212.css')\"></div>",
                "<style>@import url( fonts-12121212.css );</style>",
            )
        );
    }

    #[test]
    fn test_references_skip_external_urls() {
        let map = renames(&[("style.css", "style-1a2b3c4d.css")]);
        let html = r#"<link href="https://cdn.example.com/style.css">"#;
        assert_eq!(
            substitute_filenames(html, &map, RewriteScope::References),
            html
        );
    }

    #[test]
    fn test_relocalize_attribute() {
        let out = relocalize(r#"<img src="/assets/img.png">"#, &dirs(&["assets"]));
        assert_eq!(out, r#"<img src="./assets/img.png">"#);
    }

    #[test]
    fn test_relocalize_ignores_partial_directory_name() {
        let html = r#"<a href="/assets-backup/x">x</a>"#;
        assert_eq!(relocalize(html, &dirs(&["assets"])), html);
    }

    #[test]
    fn test_relocalize_requires_leading_boundary() {
        // Not preceded by a quote or whitespace
        let html = r#"<a href="https://example.com/assets/x">x</a>"#;
        assert_eq!(relocalize(html, &dirs(&["assets"])), html);
    }

    #[test]
    fn test_relocalize_bare_directory_and_whitespace() {
        let out = relocalize(
            "<a href='/docs'>docs</a> see /docs/intro\n",
            &dirs(&["docs"]),
        );
        assert_eq!(out, "<a href='./docs'>docs</a> see ./docs/intro\n");
    }

    #[test]
    fn test_relocalize_needs_trailing_character() {
        assert_eq!(relocalize(" /docs", &dirs(&["docs"])), " /docs");
    }

    #[test]
    fn test_relocalize_adjacent_matches() {
        let out = relocalize(r#"srcset="/img/a.png /img/b.png 2x""#, &dirs(&["img"]));
        assert_eq!(out, r#"srcset="./img/a.png ./img/b.png 2x""#);
    }

    #[test]
    fn test_relocalize_multiple_directories() {
        let out = relocalize(
            r#"<link href="/css/a.css"><script src="/js/b.js"></script>"#,
            &dirs(&["css", "js"]),
        );
        assert_eq!(
            out,
            r#"<link href="./css/a.css"><script src="./js/b.js"></script>"#
        );
    }

    #[test]
    fn test_rewrite_runs_both_passes() {
        let map = renames(&[("assets/app.js", "assets/app-cafebabe.js")]);
        let out = rewrite(
            r#"<script src="/assets/app.js"></script>"#,
            &map,
            &dirs(&["assets"]),
            RewriteScope::Literal,
        );
        assert_eq!(out, r#"<script src="./assets/app-cafebabe.js"></script>"#);
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let map = renames(&[("a.css", "a-01010101.css"), ("b.js", "b-02020202.js")]);
        let html = r#"<link href="/s/a.css"><script src="b.js"></script>"#;
        let first = rewrite(html, &map, &dirs(&["s"]), RewriteScope::References);
        let second = rewrite(html, &map, &dirs(&["s"]), RewriteScope::References);
        assert_eq!(first, second);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a/b/c.css"), "c.css");
        assert_eq!(file_name("c.css"), "c.css");
    }
}
