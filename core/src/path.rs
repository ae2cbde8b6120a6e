use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::{Error, Result};

const MAX_PATH_BYTES: usize = 4096;

/// Bytes escaped when a name is used as a single URL path segment.
///
/// Keeps RFC 3986 unreserved characters plus the sub-delims that are legal
/// inside a segment, so `a@b:c` stays readable while ` `, `%`, `(`, `/` and
/// every non-ASCII byte are escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// How `..` segments in a virtual path are treated.
///
/// The two modes are deliberately different and must stay that way: browsing
/// clamps excess `..` at the root, while anything that mutates the tree
/// rejects a `..` segment even when it would stay inside the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Pop the previous segment, or drop the `..` when already at the root.
    Clamp,
    /// Fail with `InvalidPath` on any `..` segment.
    Strict,
}

/// Percent-decodes a client-supplied path exactly once.
pub fn decode_percent(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::InvalidPath("path is not valid UTF-8 after decoding".to_string()))
}

pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Encodes every segment and joins them with `/`; the separators themselves stay literal.
pub fn encode_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|seg| encode_segment(seg.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

/// Splits a decoded virtual path into the segments it names below the root.
///
/// Leading slashes are ignored: every virtual path is relative to the served
/// root. Empty and `.` segments are dropped.
pub fn normalize_virtual_path(input: &str, traversal: Traversal) -> Result<Vec<String>> {
    if input.len() > MAX_PATH_BYTES {
        return Err(Error::InvalidPath(format!(
            "path is too large ({} bytes; max {} bytes)",
            input.len(),
            MAX_PATH_BYTES
        )));
    }
    if input.contains('\0') {
        return Err(Error::InvalidPath("NUL bytes are not allowed".to_string()));
    }
    if input.chars().any(|ch| ch.is_control()) {
        return Err(Error::InvalidPath(
            "path must not contain control characters".to_string(),
        ));
    }

    let mut out = Vec::<String>::new();
    for seg in input.split('/') {
        // `\` is an ordinary name byte on unix but a separator on windows.
        if cfg!(windows) && seg.contains('\\') {
            return Err(Error::InvalidPath(format!("invalid segment {seg:?}")));
        }
        match seg {
            "" | "." => continue,
            ".." => match traversal {
                Traversal::Clamp => {
                    out.pop();
                }
                Traversal::Strict => {
                    return Err(Error::InvalidPath(
                        ".. segments are not allowed".to_string(),
                    ));
                }
            },
            _ => out.push(seg.to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clamp(input: &str) -> String {
        join_segments(&normalize_virtual_path(input, Traversal::Clamp).unwrap())
    }

    #[test]
    fn clamp_collapses_empty_and_dot_segments() {
        assert_eq!(clamp("/a//b/./c/"), "a/b/c");
        assert_eq!(clamp(""), "");
        assert_eq!(clamp("/"), "");
        assert_eq!(clamp("./"), "");
    }

    #[test]
    fn clamp_pops_parent_segments() {
        assert_eq!(clamp("/hols/AAA/../x"), "hols/x");
        assert_eq!(clamp("hols/.."), "");
    }

    #[test]
    fn clamp_never_climbs_above_root() {
        assert_eq!(clamp("../../"), "");
        assert_eq!(clamp("hols/../../"), "");
        assert_eq!(clamp("../../../../../../../../../../etc/passwd"), "etc/passwd");
        assert_eq!(clamp("/a/../../../b/../c"), "c");
    }

    #[test]
    fn strict_rejects_any_parent_segment() {
        // Mutations must not clamp: `a/../b` stays inside the root but still fails.
        for input in ["../BBB", "/../BBB", "a/../b", "a/..", ".."] {
            assert!(
                matches!(
                    normalize_virtual_path(input, Traversal::Strict),
                    Err(Error::InvalidPath(_))
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn strict_accepts_dotted_names_that_are_not_parent_segments() {
        let segments = normalize_virtual_path("/a/..b/c../...", Traversal::Strict).unwrap();
        assert_eq!(segments, ["a", "..b", "c..", "..."]);
    }

    #[cfg(unix)]
    #[test]
    fn backslash_stays_inside_its_segment() {
        assert_eq!(
            normalize_virtual_path("/dir/a\\b.txt", Traversal::Strict).unwrap(),
            ["dir", "a\\b.txt"]
        );
        assert_eq!(clamp("a\\..\\b"), "a\\..\\b");
    }

    #[test]
    fn rejects_nul_and_control_characters() {
        for traversal in [Traversal::Clamp, Traversal::Strict] {
            assert!(matches!(
                normalize_virtual_path("a\0b", traversal),
                Err(Error::InvalidPath(_))
            ));
            assert!(matches!(
                normalize_virtual_path("a\nb", traversal),
                Err(Error::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn rejects_oversized_paths() {
        let long = "a/".repeat(MAX_PATH_BYTES);
        assert!(matches!(
            normalize_virtual_path(&long, Traversal::Clamp),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn decode_handles_multibyte_and_encoded_separators() {
        assert_eq!(
            decode_percent("%2F%E1%84%92%E1%85%A1%20%E1%84%92%E1%85%A1").unwrap(),
            "/\u{1112}\u{1161} \u{1112}\u{1161}"
        );
        assert_eq!(decode_percent("%2E%2E%2Fx").unwrap(), "../x");
        assert_eq!(decode_percent("100%").unwrap(), "100%");
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert!(matches!(decode_percent("%FF%FE"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn decoding_happens_once() {
        // `%2541` decodes to the literal text `%41`, not to `A`.
        assert_eq!(decode_percent("%2541").unwrap(), "%41");
    }

    #[test]
    fn encode_segment_escapes_like_a_path_segment() {
        assert_eq!(
            encode_segment("curimit@gmail.com (40%)"),
            "curimit@gmail.com%20%2840%25%29"
        );
        assert_eq!(encode_segment("中文"), "%E4%B8%AD%E6%96%87");
        assert_eq!(
            encode_segment("2024-01-02-10:36:58.png"),
            "2024-01-02-10:36:58.png"
        );
        assert_eq!(encode_segment("a/b"), "a%2Fb");
    }

    #[test]
    fn encoded_names_round_trip() {
        for name in ["하 하", "curimit@gmail.com (40%)", "file_with space.html", "a+b;c=d"] {
            assert_eq!(decode_percent(&encode_segment(name)).unwrap(), name);
        }
    }

    #[test]
    fn encode_segments_keeps_separators() {
        assert_eq!(
            encode_segments(&["subdir_with space", "file.html"]),
            "subdir_with%20space/file.html"
        );
    }
}
