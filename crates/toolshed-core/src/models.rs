//! Domain models for toolshed.
//!
//! Products live outside the hierarchy engine; they only reach it
//! through the `category_id` reference counted by the store.

pub mod category;
