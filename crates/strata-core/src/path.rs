//! # Path Model
//!
//! Hierarchical locators for stored objects.
//!
//! Paths are `/`-delimited. Empty segments (leading, trailing, doubled
//! slashes) are tolerated and discarded, so `"///a/b//"` names the same
//! object as `"a/b"`. All segments but the last identify nested groups;
//! the last identifies the leaf object.

/// Decompose a path into its ordered sequence of non-empty segments.
///
/// Pure function: accepts any string, never fails. `"/"` and `""`
/// decompose to the empty sequence.
pub fn decompose(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Canonical absolute form of a path: `/a/b` for two segments, `/` for
/// the root. Canonical paths are the keys of every cache and substrate
/// table in this crate.
pub fn canonical(path: &str) -> String {
    let segments = decompose(path);
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Join a canonical parent path with a leaf name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Split a canonical path into its parent group path and leaf name.
/// Returns `None` for the root.
pub fn split_leaf(path: &str) -> Option<(String, &str)> {
    let segments = decompose(path);
    let (last, head) = segments.split_last()?;
    let parent = if head.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", head.join("/"))
    };
    Some((parent, last))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_discards_empty_segments() {
        assert_eq!(decompose("///a/b//"), vec!["a", "b"]);
    }

    #[test]
    fn decompose_root_and_empty() {
        assert!(decompose("/").is_empty());
        assert!(decompose("").is_empty());
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical(""), "/");
        assert_eq!(canonical("/"), "/");
        assert_eq!(canonical("a//b/"), "/a/b");
        assert_eq!(canonical("/a/b"), "/a/b");
    }

    #[test]
    fn join_handles_root_parent() {
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/a", "x"), "/a/x");
    }

    #[test]
    fn split_leaf_returns_parent_and_name() {
        assert_eq!(split_leaf("/a/b/c"), Some(("/a/b".to_string(), "c")));
        assert_eq!(split_leaf("/x"), Some(("/".to_string(), "x")));
        assert_eq!(split_leaf("/"), None);
    }
}
