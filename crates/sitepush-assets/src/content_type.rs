//! Content-Type lookup for uploaded objects.

/// Return the Content-Type for a path based on its extension.
///
/// Matching is case-insensitive. Unknown or missing extensions map to
/// `application/octet-stream`.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return "application/octet-stream";
    };
    match ext.to_ascii_lowercase().as_str() {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "json" => "application/json",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_html() {
        assert_eq!(content_type_for("index.html"), "text/html");
    }

    #[test]
    fn content_type_css_nested() {
        assert_eq!(content_type_for("assets/styles.css"), "text/css");
    }

    #[test]
    fn content_type_case_insensitive() {
        assert_eq!(content_type_for("img/Photo.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("APP.JS"), "application/javascript");
    }

    #[test]
    fn content_type_fonts() {
        assert_eq!(content_type_for("fonts/a.woff"), "font/woff");
        assert_eq!(content_type_for("fonts/a.woff2"), "font/woff2");
        assert_eq!(content_type_for("fonts/a.ttf"), "font/ttf");
        assert_eq!(
            content_type_for("fonts/a.eot"),
            "application/vnd.ms-fontobject"
        );
    }

    #[test]
    fn content_type_unknown() {
        assert_eq!(content_type_for("file.xyz"), "application/octet-stream");
    }

    #[test]
    fn content_type_no_extension() {
        assert_eq!(content_type_for("LICENSE"), "application/octet-stream");
        // A dot in a directory name is not an extension
        assert_eq!(content_type_for("v1.2/README"), "application/octet-stream");
    }
}
