//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The hierarchy engine holds no
//! state of its own; everything it knows comes through [`CategoryStore`].

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::ToolshedResult;
use crate::models::category::Category;

// ---------------------------------------------------------------------------
// Write batches
// ---------------------------------------------------------------------------

/// A single row mutation inside a [`WriteBatch`].
///
/// Every variant except `Insert` and `Claim` is conditioned on the row
/// still carrying `expected_version`. `Insert` under a parent is
/// conditioned on the parent's version and bumps it, so a move that read
/// the parent before the insert fails instead of leaving the new child
/// with a stale path.
#[derive(Debug, Clone)]
pub enum CategoryWrite {
    Insert {
        category: Category,
        parent_version: Option<u64>,
    },
    Relocate {
        id: Uuid,
        expected_version: u64,
        parent_id: Option<Uuid>,
        level: u32,
        path: String,
    },
    Describe {
        id: Uuid,
        expected_version: u64,
        name: String,
        description: String,
    },
    /// Also requires that no child or product references the row.
    Remove { id: Uuid, expected_version: u64 },
    /// Writes nothing; fails the batch if the row changed.
    Guard { id: Uuid, expected_version: u64 },
    /// Reserve `name` for row `id` among the children of `parent_id`
    /// (the roots when `None`). Fails the batch with `AlreadyExists` if a
    /// sibling already holds the name, compared case-insensitively.
    /// Batches claiming under the same parent collide as `Conflict`.
    Claim {
        id: Uuid,
        parent_id: Option<Uuid>,
        name: String,
    },
}

impl CategoryWrite {
    pub fn id(&self) -> Uuid {
        match self {
            CategoryWrite::Insert { category, .. } => category.id,
            CategoryWrite::Relocate { id, .. }
            | CategoryWrite::Describe { id, .. }
            | CategoryWrite::Remove { id, .. }
            | CategoryWrite::Guard { id, .. }
            | CategoryWrite::Claim { id, .. } => *id,
        }
    }
}

/// Rows committed together or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<CategoryWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: CategoryWrite) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[CategoryWrite] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<CategoryWrite> {
        self.ops
    }
}

impl From<CategoryWrite> for WriteBatch {
    fn from(op: CategoryWrite) -> Self {
        Self { ops: vec![op] }
    }
}

impl FromIterator<CategoryWrite> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = CategoryWrite>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Category store
// ---------------------------------------------------------------------------

/// Durable storage of category rows.
///
/// Sibling lists are in [`Category::sibling_order`]. Returned rows carry
/// zeroed `children_count` / `product_count`; annotating them is the
/// caller's job.
pub trait CategoryStore: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ToolshedResult<Category>> + Send;

    /// Direct children only.
    fn get_children(
        &self,
        parent_id: Uuid,
    ) -> impl Future<Output = ToolshedResult<Vec<Category>>> + Send;

    fn get_roots(&self) -> impl Future<Output = ToolshedResult<Vec<Category>>> + Send;

    /// The node at `path` plus every row whose path starts with
    /// `path` + separator, ordered by level then sibling order.
    fn get_subtree(
        &self,
        path: &str,
    ) -> impl Future<Output = ToolshedResult<Vec<Category>>> + Send;

    /// Every category, ordered by level then sibling order.
    fn get_all(&self) -> impl Future<Output = ToolshedResult<Vec<Category>>> + Send;

    fn count_children(&self, id: Uuid) -> impl Future<Output = ToolshedResult<u64>> + Send;

    fn count_products(&self, id: Uuid) -> impl Future<Output = ToolshedResult<u64>> + Send;

    /// Child counts keyed by parent id. Ids without children are absent.
    fn count_children_many(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = ToolshedResult<HashMap<Uuid, u64>>> + Send;

    /// Product counts keyed by category id. Ids without products are absent.
    fn count_products_many(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = ToolshedResult<HashMap<Uuid, u64>>> + Send;

    /// Commit every op in `batch` atomically. A failed version or
    /// reference guard rejects the whole batch with `Conflict`; a taken
    /// sibling name rejects it with `AlreadyExists`.
    fn atomic_write(&self, batch: WriteBatch) -> impl Future<Output = ToolshedResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_collects_ops_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let batch: WriteBatch = [
            CategoryWrite::Remove {
                id: a,
                expected_version: 0,
            },
            CategoryWrite::Remove {
                id: b,
                expected_version: 3,
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.len(), 2);
        let ids: Vec<Uuid> = batch.ops().iter().map(CategoryWrite::id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn empty_batch() {
        assert!(WriteBatch::new().is_empty());
    }
}
