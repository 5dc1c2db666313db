//! Read model: nested tree, flat listing and breadcrumb views built
//! from raw category rows.
//!
//! Assembly is a single pass. Rows are grouped by `parent_id` once and
//! children are attached recursively from the root set, so a whole
//! hierarchy costs one store query regardless of its depth.

use std::collections::HashMap;

use serde::Serialize;
use toolshed_core::models::category::Category;
use uuid::Uuid;

/// A category with its children attached, in
/// [`Category::sibling_order`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    /// Number of nodes in this tree, including the root.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTree::size).sum::<usize>()
    }

    /// Depth-first search for `id`.
    pub fn find(&self, id: Uuid) -> Option<&CategoryTree> {
        if self.category.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

/// One row of the flat listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryListing {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub level: u32,
    pub path: String,
    pub children_count: u64,
    pub product_count: u64,
}

impl From<&Category> for CategoryListing {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            parent_id: category.parent_id,
            level: category.level,
            path: category.path.clone(),
            children_count: category.children_count,
            product_count: category.product_count,
        }
    }
}

fn sort_siblings(siblings: &mut [Category]) {
    siblings.sort_by(Category::sibling_order);
}

fn attach(mut category: Category, by_parent: &mut HashMap<Uuid, Vec<Category>>) -> CategoryTree {
    let mut kids = by_parent.remove(&category.id).unwrap_or_default();
    sort_siblings(&mut kids);
    let children: Vec<CategoryTree> = kids
        .into_iter()
        .map(|kid| attach(kid, by_parent))
        .collect();
    category.children_count = children.len() as u64;
    CategoryTree { category, children }
}

fn assemble(rows: Vec<Category>, is_root: impl Fn(&Category) -> bool) -> Vec<CategoryTree> {
    let mut roots = Vec::new();
    let mut by_parent: HashMap<Uuid, Vec<Category>> = HashMap::new();
    for row in rows {
        if is_root(&row) {
            roots.push(row);
        } else if let Some(parent_id) = row.parent_id {
            by_parent.entry(parent_id).or_default().push(row);
        }
    }
    sort_siblings(&mut roots);
    roots
        .into_iter()
        .map(|root| attach(root, &mut by_parent))
        .collect()
}

/// Nest every root and its descendants. Rows whose parent is absent
/// from `rows` are left out.
pub fn build_forest(rows: Vec<Category>) -> Vec<CategoryTree> {
    assemble(rows, Category::is_root)
}

/// Nest the subtree rooted at `root_id`, or `None` if that row is absent.
pub fn build_subtree(rows: Vec<Category>, root_id: Uuid) -> Option<CategoryTree> {
    assemble(rows, |row| row.id == root_id).into_iter().next()
}

/// Pre-order flattening of a forest.
pub fn flatten(forest: &[CategoryTree]) -> Vec<CategoryListing> {
    fn walk(node: &CategoryTree, out: &mut Vec<CategoryListing>) {
        out.push(CategoryListing::from(&node.category));
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, &mut out);
    }
    out
}

/// Render a root-to-node path as display text, e.g. `Tools > Drills`.
pub fn breadcrumb(path: &[Category], separator: &str) -> String {
    path.iter()
        .map(|category| category.name.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}
