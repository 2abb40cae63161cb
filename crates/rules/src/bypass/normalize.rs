//! Request path decoding and normalization.

use std::borrow::Cow;

/// Normalize a request or rule path.
///
/// Percent-decodes (falling back to the raw text when the result is not
/// UTF-8), forces a leading `/`, lexically resolves `.`, `..` and repeated
/// separators, and keeps a trailing `/` if the input had one.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return "/".to_string();
    }

    let decoded = decode_path(raw);
    let rooted: Cow<'_, str> = if decoded.starts_with('/') {
        decoded
    } else {
        Cow::Owned(format!("/{}", decoded))
    };

    let mut clean = clean_rooted(&rooted);
    if rooted.ends_with('/') && clean != "/" {
        clean.push('/');
    }
    clean
}

/// Percent-decode a request path, keeping the raw text when the decoded
/// bytes are not UTF-8. No segment cleanup.
pub fn decode_path(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Compare two normalized paths ignoring one trailing slash (root excepted).
pub fn eq_loosely(a: &str, b: &str) -> bool {
    strip_trailing_slash(a) == strip_trailing_slash(b)
}

fn strip_trailing_slash(s: &str) -> &str {
    if s == "/" {
        return s;
    }
    s.strip_suffix('/').unwrap_or(s)
}

fn clean_rooted(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
