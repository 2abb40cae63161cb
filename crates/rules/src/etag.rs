//! Content fingerprints used as optimistic-concurrency preconditions.

use sha2::{Digest, Sha256};

/// Weak validator over the exact file bytes: `W/"sha256:<hex>"`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("W/\"sha256:{}\"", hex::encode(digest))
}

/// The file changed since the caller last read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub current_etag: String,
}

/// Compare a caller's `If-Match` token against the current content.
///
/// A missing or blank token skips the check. Returns the current fingerprint
/// when the write may proceed.
pub fn check_precondition(current: &[u8], if_match: Option<&str>) -> Result<String, Conflict> {
    let current_etag = fingerprint(current);
    match if_match.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) if token != current_etag => Err(Conflict { current_etag }),
        _ => Ok(current_etag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_weak_sha256() {
        let etag = fingerprint(b"");
        assert_eq!(
            etag,
            "W/\"sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\""
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        assert_ne!(fingerprint(b"/a\n"), fingerprint(b"/a\n/b\n"));
        assert_eq!(fingerprint(b"/a\n"), fingerprint(b"/a\n"));
    }

    #[test]
    fn matching_token_passes() {
        let etag = fingerprint(b"content");
        assert_eq!(check_precondition(b"content", Some(&etag)), Ok(etag));
    }

    #[test]
    fn missing_token_skips_check() {
        assert!(check_precondition(b"content", None).is_ok());
        assert!(check_precondition(b"content", Some("  ")).is_ok());
    }

    #[test]
    fn stale_token_conflicts_with_current_etag() {
        let stale = fingerprint(b"old");
        let err = check_precondition(b"new", Some(&stale)).unwrap_err();
        assert_eq!(err.current_etag, fingerprint(b"new"));
    }
}
