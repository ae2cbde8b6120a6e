use std::fmt::Write as _;

use axum::http::HeaderValue;

use dirserve::vfs::{DirEntry, EntryKind, ResolvedPath};
use dirserve_core::path::encode_segments;

/// Canonical URL of a directory: mount prefix, encoded segments, trailing slash.
pub(super) fn dir_href(prefix: &str, dir: &ResolvedPath) -> String {
    if dir.is_root() {
        return prefix.to_string();
    }
    format!("{prefix}{}/", encode_segments(dir.segments()))
}

pub(super) fn render_listing(dir: &ResolvedPath, entries: &[DirEntry]) -> String {
    let rel = if dir.is_root() {
        String::new()
    } else {
        format!("{}/", dir.virtual_path())
    };
    let title = escape(&format!("/{rel}"));

    let mut html = String::with_capacity(512 + entries.len() * 96);
    html.push_str("<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(html, "<title>{title}</title>");
    html.push_str("</head>\n<body>\n");
    let _ = writeln!(html, "<h1>./{}</h1>", escape(&rel));
    html.push_str("<table>\n");

    if !dir.is_root() {
        html.push_str("<tr><td><a href=\"../\">../</a></td><td></td></tr>\n");
    }
    for entry in entries {
        let name = escape(&entry.name);
        let href = escape(&entry.href);
        match entry.kind {
            EntryKind::Directory => {
                let _ = writeln!(
                    html,
                    "<tr><td><a href=\"{href}/\">{name}/</a></td><td></td></tr>"
                );
            }
            EntryKind::File => {
                let _ = writeln!(
                    html,
                    "<tr><td><a href=\"{href}\">{name}</a></td><td>{}</td></tr>",
                    human_size(entry.size_bytes)
                );
            }
        }
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub(super) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub(super) fn content_type(name: &str) -> HeaderValue {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, href: &str, kind: EntryKind, size_bytes: u64) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            href: href.to_string(),
            kind,
            size_bytes,
            modified_ms: None,
            is_symlink: false,
        }
    }

    #[test]
    fn escapes_markup_in_names() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape("curimit@gmail.com (40%)"), "curimit@gmail.com (40%)");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1024), "1.0 KiB");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("index.HTML"), "text/html");
        assert_eq!(content_type("glasgow.jpg"), "image/jpeg");
        assert_eq!(content_type("blob.nosuchext"), "application/octet-stream");
        assert_eq!(content_type("Makefile"), "application/octet-stream");
    }

    #[test]
    fn listing_rows_link_relative_to_the_directory() {
        let rows = [
            entry("hols", "hols", EntryKind::Directory, 0),
            entry("a b.html", "a%20b.html", EntryKind::File, 2048),
        ];
        let dir = tempfile::tempdir().unwrap();
        let vfs = dirserve::vfs::DirVfs::new(dir.path(), Default::default()).unwrap();
        let root = vfs
            .resolve("/", dirserve_core::path::Traversal::Clamp)
            .unwrap();

        let html = render_listing(&root, &rows);
        assert!(html.contains("<title>/</title>"));
        assert!(html.contains("<h1>./</h1>"));
        assert!(!html.contains("href=\"../\""));
        assert!(html.contains("<a href=\"hols/\">hols/</a>"));
        assert!(html.contains("<a href=\"a%20b.html\">a b.html</a></td><td>2.0 KiB</td>"));
        assert_eq!(dir_href("/fancy/", &root), "/fancy/");
    }

    #[test]
    fn nested_listing_has_parent_link_and_relative_title() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("中文")).unwrap();
        let vfs = dirserve::vfs::DirVfs::new(dir.path(), Default::default()).unwrap();
        let nested = vfs
            .resolve("/中文", dirserve_core::path::Traversal::Clamp)
            .unwrap();

        let html = render_listing(&nested, &[]);
        assert!(html.contains("<title>/中文/</title>"));
        assert!(html.contains("<h1>./中文/</h1>"));
        assert!(html.contains("<a href=\"../\">../</a>"));
        assert_eq!(dir_href("/", &nested), "/%E4%B8%AD%E6%96%87/");
    }
}
