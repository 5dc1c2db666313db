//! SurrealDB repository implementations.

mod category;

pub use category::SurrealCategoryStore;
