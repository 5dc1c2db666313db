//! Materialized path encoding for the category tree.
//!
//! A path lists every ancestor id from the root down to the node itself,
//! joined by [`SEPARATOR`]. Category ids are hyphenated UUIDs, so the
//! separator can never occur inside a segment.

use thiserror::Error;
use uuid::Uuid;

/// Segment separator. Never produced by `Uuid`'s hyphenated form.
pub const SEPARATOR: char = '/';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("invalid path segment {segment:?}")]
    InvalidSegment { segment: String },

    #[error("{id} already appears in path {path}")]
    Cycle { id: Uuid, path: String },

    #[error("path {path} is not under prefix {prefix}")]
    NotUnderPrefix { path: String, prefix: String },
}

/// Path of a category that has no parent.
pub fn root_path(id: Uuid) -> String {
    id.to_string()
}

/// Path of `id` placed directly under a node whose path is `parent_path`.
pub fn child_path(parent_path: &str, id: Uuid) -> Result<String, PathError> {
    let ancestors = decode(parent_path)?;
    if ancestors.contains(&id) {
        return Err(PathError::Cycle {
            id,
            path: parent_path.to_string(),
        });
    }
    Ok(format!("{parent_path}{SEPARATOR}{id}"))
}

/// Ids from root to leaf.
pub fn decode(path: &str) -> Result<Vec<Uuid>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    path.split(SEPARATOR)
        .map(|segment| {
            Uuid::parse_str(segment).map_err(|_| PathError::InvalidSegment {
                segment: segment.to_string(),
            })
        })
        .collect()
}

/// True iff `candidate` lies strictly below `ancestor`.
///
/// This is the only containment test used for cycle and subtree checks.
pub fn is_descendant_path(candidate: &str, ancestor: &str) -> bool {
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Number of separators in `path`, which equals the node's level.
pub fn depth(path: &str) -> u32 {
    path.matches(SEPARATOR).count() as u32
}

/// Replace the `old_prefix` head of `path` with `new_prefix`.
///
/// `path` must be `old_prefix` itself or a descendant of it.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Result<String, PathError> {
    if path == old_prefix {
        return Ok(new_prefix.to_string());
    }
    if !is_descendant_path(path, old_prefix) {
        return Err(PathError::NotUnderPrefix {
            path: path.to_string(),
            prefix: old_prefix.to_string(),
        });
    }
    Ok(format!("{new_prefix}{}", &path[old_prefix.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_child_paths() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let root = root_path(a);
        assert_eq!(root, a.to_string());

        let child = child_path(&root, b).unwrap();
        assert_eq!(child, format!("{a}/{b}"));
        assert_eq!(depth(&root), 0);
        assert_eq!(depth(&child), 1);
        assert_eq!(decode(&child).unwrap(), vec![a, b]);
    }

    #[test]
    fn child_path_rejects_repeated_segment() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let path = child_path(&root_path(a), b).unwrap();

        let err = child_path(&path, a).unwrap_err();
        assert_eq!(err, PathError::Cycle { id: a, path });
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(decode(""), Err(PathError::Empty));
        let a = Uuid::new_v4();
        assert!(matches!(
            decode(&format!("{a}/not-a-uuid")),
            Err(PathError::InvalidSegment { .. })
        ));
        assert!(matches!(
            decode(&format!("{a}/")),
            Err(PathError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn descendant_check_requires_separator_boundary() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parent = root_path(a);
        let child = child_path(&parent, b).unwrap();

        assert!(is_descendant_path(&child, &parent));
        assert!(!is_descendant_path(&parent, &parent));
        assert!(!is_descendant_path(&parent, &child));
        // A textual prefix that stops mid-segment is not an ancestor.
        assert!(!is_descendant_path(&child, &parent[..10]));
    }

    #[test]
    fn rebase_swaps_prefix() {
        let [a, b, c, d] = [(); 4].map(|_| Uuid::new_v4());
        let old = child_path(&root_path(a), b).unwrap();
        let leaf = child_path(&old, c).unwrap();
        let new = child_path(&root_path(d), b).unwrap();

        assert_eq!(rebase(&old, &old, &new).unwrap(), new);
        assert_eq!(rebase(&leaf, &old, &new).unwrap(), format!("{d}/{b}/{c}"));
        assert!(matches!(
            rebase(&root_path(d), &old, &new),
            Err(PathError::NotUnderPrefix { .. })
        ));
    }
}
