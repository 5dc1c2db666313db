//! Toolshed Catalog — the category hierarchy engine.
//!
//! [`HierarchyEngine`] validates and executes structural edits over a
//! materialized-path tree and serves tree queries; the [`tree`] module
//! shapes raw rows into nested and flat views for presentation.

pub mod config;
pub mod engine;
pub mod tree;

pub use config::HierarchyConfig;
pub use engine::HierarchyEngine;
pub use tree::{CategoryListing, CategoryTree};
