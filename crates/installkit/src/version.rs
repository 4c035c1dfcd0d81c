//! Version string normalization.
//!
//! Tools disagree on whether a version carries a leading `v` (`runc
//! --version` prints `1.1.12`, `kubectl` prints `v1.30.2`). Comparisons are
//! always made on the normalized form, which is plain string equality: no
//! semantic ordering, so a target older than the installed binary still
//! triggers a reinstall.

/// Sentinel reported when no installed version could be determined.
pub const NONE: &str = "none";

/// Strip surrounding whitespace and one leading `v`/`V`.
///
/// ```
/// use installkit::version::normalize;
///
/// assert_eq!(normalize("v1.7.19"), "1.7.19");
/// assert_eq!(normalize(" 1.7.19\n"), "1.7.19");
/// ```
#[must_use]
pub fn normalize(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Normalized version with a leading `v`, as used in release tags.
#[must_use]
pub fn tag(version: &str) -> String {
    format!("v{}", normalize(version))
}

/// Whether two versions are the same after normalization.
///
/// The [`NONE`] sentinel and empty strings never match anything.
#[must_use]
pub fn same_version(current: &str, target: &str) -> bool {
    let current = normalize(current);
    let target = normalize(target);
    !current.is_empty() && current != NONE && current == target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_single_v() {
        assert_eq!(normalize("v1.7.19"), "1.7.19");
        assert_eq!(normalize("V1.7.19"), "1.7.19");
        assert_eq!(normalize("1.7.19"), "1.7.19");
        assert_eq!(normalize("vv1"), "v1");
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(normalize("  v3.5.15\n"), "3.5.15");
    }

    #[test]
    fn test_tag() {
        assert_eq!(tag("1.30.2"), "v1.30.2");
        assert_eq!(tag("v1.30.2"), "v1.30.2");
    }

    #[test]
    fn test_same_version_ignores_prefix() {
        assert!(same_version("v1.7.19", "1.7.19"));
        assert!(same_version("1.7.19", "v1.7.19"));
    }

    #[test]
    fn test_same_version_none_never_matches() {
        assert!(!same_version(NONE, "1.7.19"));
        assert!(!same_version(NONE, NONE));
        assert!(!same_version("", ""));
    }

    #[test]
    fn test_same_version_no_ordering() {
        // Older target than installed is still "different".
        assert!(!same_version("1.30.2", "1.29.0"));
    }
}
