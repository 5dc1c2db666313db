//! Category domain model.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in the product category tree.
///
/// `level` and `path` are derived from the parent chain and are only
/// ever recomputed by the hierarchy engine, never set by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// `None` marks a root.
    pub parent_id: Option<Uuid>,
    /// Depth in the tree; roots are at 0.
    pub level: u32,
    /// Materialized ancestor chain, root first, ending with `id`.
    pub path: String,
    /// Direct children, computed on read.
    #[serde(default)]
    pub children_count: u64,
    /// Products referencing this category, computed on read.
    #[serde(default)]
    pub product_count: u64,
    /// Optimistic concurrency token, bumped on every committed write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Display order among siblings: name ignoring case, then exact name,
    /// then creation time. Matches how sibling names are deduplicated.
    pub fn sibling_order(&self, other: &Category) -> Ordering {
        self.name
            .to_lowercase()
            .cmp(&other.name.to_lowercase())
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.created_at.cmp(&other.created_at))
    }
}

/// Fields required to create a new category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
}

/// Display fields that can be changed in place. Never path-affecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCategory {
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Category {
        let id = Uuid::new_v4();
        Category {
            id,
            name: name.into(),
            description: String::new(),
            parent_id: None,
            level: 0,
            path: id.to_string(),
            children_count: 0,
            product_count: 0,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn siblings_sort_ignoring_case() {
        let mut rows = vec![named("Washers"), named("bolts"), named("Anchors")];
        rows.sort_by(Category::sibling_order);
        let names: Vec<&str> = rows.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Anchors", "bolts", "Washers"]);
    }

    #[test]
    fn sibling_ties_fall_back_to_creation_time() {
        let older = named("Nails");
        let mut newer = named("Nails");
        newer.created_at = older.created_at + chrono::Duration::seconds(1);
        assert_eq!(older.sibling_order(&newer), Ordering::Less);
    }
}
