//! Hierarchy engine — validation and orchestration of category tree
//! mutations and queries.

use chrono::Utc;
use toolshed_core::error::{ToolshedError, ToolshedResult};
use toolshed_core::models::category::{Category, CreateCategory, UpdateCategory};
use toolshed_core::path;
use toolshed_core::repository::{CategoryStore, CategoryWrite, WriteBatch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::HierarchyConfig;
use crate::tree::{self, CategoryTree};

/// Category hierarchy engine.
///
/// Generic over the store implementation so that the engine has no
/// dependency on the database crate. It keeps no state between calls;
/// concurrent structural edits are arbitrated by the store's version
/// guards and surface here as `Conflict`, which is never retried
/// internally.
pub struct HierarchyEngine<S: CategoryStore> {
    store: S,
    config: HierarchyConfig,
}

impl<S: CategoryStore> HierarchyEngine<S> {
    pub fn new(store: S, config: HierarchyConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a category under `parent_id`, or as a root when `None`.
    pub async fn create_category(&self, input: CreateCategory) -> ToolshedResult<Category> {
        let name = self.normalize_name(&input.name)?;
        let id = Uuid::new_v4();

        let (parent_version, level, category_path) = match input.parent_id {
            Some(parent_id) => {
                let parent = self.fetch_parent(parent_id).await?;
                if parent.level >= self.config.max_depth {
                    return Err(ToolshedError::validation(format!(
                        "category depth limit of {} reached under {}",
                        self.config.max_depth, parent.id
                    )));
                }
                let child_path = path::child_path(&parent.path, id)?;
                (Some(parent.version), parent.level + 1, child_path)
            }
            None => (None, 0, path::root_path(id)),
        };

        let siblings = self.siblings(input.parent_id).await?;
        ensure_unique_name(&siblings, &name, None)?;

        let now = Utc::now();
        let claim = CategoryWrite::Claim {
            id,
            parent_id: input.parent_id,
            name: name.clone(),
        };
        let category = Category {
            id,
            name,
            description: input.description,
            parent_id: input.parent_id,
            level,
            path: category_path,
            children_count: 0,
            product_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::new();
        batch
            .push(CategoryWrite::Insert {
                category,
                parent_version,
            })
            .push(claim);
        self.store.atomic_write(batch).await?;

        let created = self.store.get_by_id(id).await?;
        info!(
            category_id = %created.id,
            parent_id = ?created.parent_id,
            level = created.level,
            "Category created"
        );
        Ok(created)
    }

    /// Change name and description in place. Never touches path or level.
    pub async fn update_category(
        &self,
        id: Uuid,
        input: UpdateCategory,
    ) -> ToolshedResult<Category> {
        let node = self.store.get_by_id(id).await?;
        let name = self.normalize_name(&input.name)?;

        let siblings = self.siblings(node.parent_id).await?;
        ensure_unique_name(&siblings, &name, Some(node.id))?;

        let mut batch = WriteBatch::new();
        batch
            .push(CategoryWrite::Claim {
                id,
                parent_id: node.parent_id,
                name: name.clone(),
            })
            .push(CategoryWrite::Describe {
                id,
                expected_version: node.version,
                name,
                description: input.description,
            });
        self.store.atomic_write(batch).await?;

        info!(category_id = %id, "Category updated");
        let updated = self.store.get_by_id(id).await?;
        self.annotate(updated).await
    }

    /// Relocate `id` and its whole subtree under `new_parent_id`, or make
    /// it a root when `None`.
    ///
    /// Moving a node to the parent it already has is an idempotent
    /// success: the node comes back unchanged and nothing is written.
    pub async fn move_category(
        &self,
        id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> ToolshedResult<Category> {
        let node = self.store.get_by_id(id).await?;

        let new_parent = match new_parent_id {
            Some(parent_id) => {
                let parent = self.fetch_parent(parent_id).await?;
                if parent.id == node.id {
                    warn!(category_id = %id, "Refused to make category its own parent");
                    return Err(ToolshedError::invalid_move(format!(
                        "category {id} cannot be its own parent"
                    )));
                }
                if path::is_descendant_path(&parent.path, &node.path) {
                    warn!(
                        category_id = %id,
                        new_parent_id = %parent.id,
                        "Refused to move category under its own descendant"
                    );
                    return Err(ToolshedError::invalid_move(format!(
                        "category {} is a descendant of {id}; moving would create a cycle",
                        parent.id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        if new_parent_id == node.parent_id {
            debug!(category_id = %id, "Move target is the current parent; nothing to do");
            return self.annotate(node).await;
        }

        let (new_level, new_path) = match &new_parent {
            Some(parent) => (parent.level + 1, path::child_path(&parent.path, node.id)?),
            None => (0, path::root_path(node.id)),
        };

        let siblings = self.siblings(new_parent_id).await?;
        ensure_unique_name(&siblings, &node.name, Some(node.id))?;

        let subtree = self.store.get_subtree(&node.path).await?;
        if !subtree.iter().any(|row| row.id == node.id) {
            return Err(self.corrupted(format!(
                "subtree of {id} at {} does not contain the node itself",
                node.path
            )));
        }

        let delta = i64::from(new_level) - i64::from(node.level);
        let deepest = subtree.iter().map(|row| row.level).max().unwrap_or(node.level);
        if i64::from(deepest) + delta > i64::from(self.config.max_depth) {
            return Err(ToolshedError::validation(format!(
                "moving {id} would place descendants beyond depth {}",
                self.config.max_depth
            )));
        }

        let mut batch: WriteBatch = subtree
            .iter()
            .map(|row| self.relocation(row, &node, new_parent_id, &new_path, delta))
            .collect::<ToolshedResult<_>>()?;
        batch.push(CategoryWrite::Claim {
            id: node.id,
            parent_id: new_parent_id,
            name: node.name.clone(),
        });
        if let Some(parent) = &new_parent {
            // The new parent must not be moved (e.g. into this subtree)
            // between our read and the commit.
            batch.push(CategoryWrite::Guard {
                id: parent.id,
                expected_version: parent.version,
            });
        }

        let rows = subtree.len();
        self.store.atomic_write(batch).await?;

        info!(
            category_id = %id,
            old_parent_id = ?node.parent_id,
            new_parent_id = ?new_parent_id,
            rows,
            "Category subtree moved"
        );
        let moved = self.store.get_by_id(id).await?;
        self.annotate(moved).await
    }

    /// Remove a leaf category. Refused while children or products still
    /// reference it; nothing is cascaded.
    pub async fn delete_category(&self, id: Uuid) -> ToolshedResult<()> {
        let node = self.store.get_by_id(id).await?;

        let children = self.store.count_children(id).await?;
        if children > 0 {
            warn!(category_id = %id, children, "Refused to delete category with children");
            return Err(ToolshedError::HasChildren {
                id: id.to_string(),
                count: children,
            });
        }

        let products = self.store.count_products(id).await?;
        if products > 0 {
            warn!(category_id = %id, products, "Refused to delete category with products");
            return Err(ToolshedError::HasProducts {
                id: id.to_string(),
                count: products,
            });
        }

        self.store
            .atomic_write(
                CategoryWrite::Remove {
                    id,
                    expected_version: node.version,
                }
                .into(),
            )
            .await?;

        info!(category_id = %id, "Category deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_category_by_id(&self, id: Uuid) -> ToolshedResult<Category> {
        let category = self.store.get_by_id(id).await?;
        self.annotate(category).await
    }

    pub async fn get_root_categories(&self) -> ToolshedResult<Vec<Category>> {
        let roots = self.store.get_roots().await?;
        self.annotate_many(roots).await
    }

    /// Direct children of `id`. Fails `NotFound` if `id` itself is missing.
    pub async fn get_category_children(&self, id: Uuid) -> ToolshedResult<Vec<Category>> {
        self.store.get_by_id(id).await?;
        let children = self.store.get_children(id).await?;
        self.annotate_many(children).await
    }

    /// Categories from the root down to `id`, inclusive.
    pub async fn get_category_path(&self, id: Uuid) -> ToolshedResult<Vec<Category>> {
        let node = self.store.get_by_id(id).await?;
        let ids = path::decode(&node.path).map_err(|e| {
            self.corrupted(format!("category {id} has unreadable path {:?}: {e}", node.path))
        })?;

        let Some((last, ancestors)) = ids.split_last() else {
            return Err(self.corrupted(format!("category {id} has an empty path")));
        };
        if *last != node.id {
            return Err(self.corrupted(format!(
                "path {} of category {id} does not end with its own id",
                node.path
            )));
        }

        let mut chain = Vec::with_capacity(ids.len());
        for ancestor_id in ancestors {
            match self.store.get_by_id(*ancestor_id).await {
                Ok(ancestor) => chain.push(ancestor),
                Err(ToolshedError::NotFound { .. }) => {
                    return Err(self.corrupted(format!(
                        "ancestor {ancestor_id} referenced by path {} no longer exists",
                        node.path
                    )));
                }
                Err(e) => return Err(e),
            }
        }
        chain.push(node);
        Ok(chain)
    }

    /// Nested view of the subtree rooted at `id`, or of every root when
    /// `None`. One store read for the rows, one for product counts.
    pub async fn get_category_hierarchy(
        &self,
        id: Option<Uuid>,
    ) -> ToolshedResult<Vec<CategoryTree>> {
        let mut rows = match id {
            Some(id) => {
                let node = self.store.get_by_id(id).await?;
                self.store.get_subtree(&node.path).await?
            }
            None => self.store.get_all().await?,
        };

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let products = self.store.count_products_many(&ids).await?;
        for row in &mut rows {
            row.product_count = products.get(&row.id).copied().unwrap_or(0);
        }

        let fetched = rows.len();
        let forest = match id {
            Some(id) => tree::build_subtree(rows, id).into_iter().collect(),
            None => tree::build_forest(rows),
        };

        let attached: usize = forest.iter().map(CategoryTree::size).sum();
        if attached != fetched {
            return Err(self.corrupted(format!(
                "{} of {fetched} categories are not reachable through parent links",
                fetched - attached
            )));
        }
        Ok(forest)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn normalize_name(&self, name: &str) -> ToolshedResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolshedError::validation("category name must not be empty"));
        }
        if name.chars().count() > self.config.max_name_length {
            return Err(ToolshedError::validation(format!(
                "category name exceeds {} characters",
                self.config.max_name_length
            )));
        }
        Ok(name.to_string())
    }

    async fn fetch_parent(&self, parent_id: Uuid) -> ToolshedResult<Category> {
        match self.store.get_by_id(parent_id).await {
            Err(ToolshedError::NotFound { .. }) => Err(ToolshedError::ParentNotFound {
                id: parent_id.to_string(),
            }),
            other => other,
        }
    }

    async fn siblings(&self, parent_id: Option<Uuid>) -> ToolshedResult<Vec<Category>> {
        match parent_id {
            Some(parent_id) => self.store.get_children(parent_id).await,
            None => self.store.get_roots().await,
        }
    }

    /// Rewrite one subtree row for a move of `node` to `new_path`.
    fn relocation(
        &self,
        row: &Category,
        node: &Category,
        new_parent_id: Option<Uuid>,
        new_path: &str,
        delta: i64,
    ) -> ToolshedResult<CategoryWrite> {
        let rebased = path::rebase(&row.path, &node.path, new_path).map_err(|e| {
            self.corrupted(format!("row {} escaped subtree {}: {e}", row.id, node.path))
        })?;

        let level = i64::from(row.level) + delta;
        if level != i64::from(path::depth(&rebased)) {
            return Err(self.corrupted(format!(
                "row {} has level {} inconsistent with path {}",
                row.id, row.level, row.path
            )));
        }

        let parent_id = if row.id == node.id {
            new_parent_id
        } else {
            row.parent_id
        };
        Ok(CategoryWrite::Relocate {
            id: row.id,
            expected_version: row.version,
            parent_id,
            level: path::depth(&rebased),
            path: rebased,
        })
    }

    async fn annotate(&self, mut category: Category) -> ToolshedResult<Category> {
        category.children_count = self.store.count_children(category.id).await?;
        category.product_count = self.store.count_products(category.id).await?;
        Ok(category)
    }

    async fn annotate_many(&self, mut categories: Vec<Category>) -> ToolshedResult<Vec<Category>> {
        let ids: Vec<Uuid> = categories.iter().map(|c| c.id).collect();
        let children = self.store.count_children_many(&ids).await?;
        let products = self.store.count_products_many(&ids).await?;
        for category in &mut categories {
            category.children_count = children.get(&category.id).copied().unwrap_or(0);
            category.product_count = products.get(&category.id).copied().unwrap_or(0);
        }
        Ok(categories)
    }

    /// Log and build a fatal data-corruption error.
    fn corrupted(&self, message: String) -> ToolshedError {
        error!(%message, "Category hierarchy invariant violated");
        ToolshedError::invariant(message)
    }
}

/// Siblings may not share a name, compared case-insensitively.
fn ensure_unique_name(siblings: &[Category], name: &str, except: Option<Uuid>) -> ToolshedResult<()> {
    let wanted = name.to_lowercase();
    let clash = siblings
        .iter()
        .any(|sibling| Some(sibling.id) != except && sibling.name.to_lowercase() == wanted);
    if clash {
        return Err(ToolshedError::AlreadyExists {
            entity: format!("category {name:?} under the same parent"),
        });
    }
    Ok(())
}
