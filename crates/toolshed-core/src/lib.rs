//! Toolshed Core — domain types, error taxonomy, materialized path
//! codec and the persistence contract for the category hierarchy.

pub mod error;
pub mod models;
pub mod path;
pub mod repository;
