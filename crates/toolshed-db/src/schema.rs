//! Category schema and the versioned migrations that install it.
//!
//! Tables are SCHEMAFULL. UUIDs are stored as strings, including the
//! `parent_id` and `category_id` references.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — category tree and the product reference it is counted by
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Categories (materialized-path tree)
-- =======================================================================
DEFINE TABLE category SCHEMAFULL;
DEFINE FIELD name ON TABLE category TYPE string \
    ASSERT string::len($value) > 0;
DEFINE FIELD description ON TABLE category TYPE string DEFAULT '';
DEFINE FIELD parent_id ON TABLE category TYPE option<string>;
DEFINE FIELD level ON TABLE category TYPE int ASSERT $value >= 0;
DEFINE FIELD path ON TABLE category TYPE string;
DEFINE FIELD version ON TABLE category TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE category TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE category TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_category_parent ON TABLE category COLUMNS parent_id;
DEFINE INDEX idx_category_path ON TABLE category COLUMNS path UNIQUE;

-- One row per sibling set, keyed by parent id or 'root'. Every name
-- claim writes it so that concurrent claims on one set collide.
DEFINE TABLE category_siblings SCHEMAFULL;
DEFINE FIELD claimed_at ON TABLE category_siblings TYPE datetime;

-- =======================================================================
-- Products (owned by the inventory layer; only category_id matters here)
-- =======================================================================
DEFINE TABLE product SCHEMAFULL;
DEFINE FIELD name ON TABLE product TYPE string;
DEFINE FIELD sku ON TABLE product TYPE string;
DEFINE FIELD category_id ON TABLE product TYPE option<string>;
DEFINE FIELD created_at ON TABLE product TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_product_sku ON TABLE product COLUMNS sku UNIQUE;
DEFINE INDEX idx_product_category ON TABLE product COLUMNS category_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Highest migration version recorded in `_migration`, or 0.
async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map_or(0, |m| m.version))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying category schema migration"
    );
    db.query(migration.sql).await?.check().map_err(|e| {
        DbError::Migration(format!("v{} {}: {e}", migration.version, migration.name))
    })?;

    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("recording v{}: {e}", migration.version)))?;
    Ok(())
}

/// Bring the category schema up to date.
///
/// Safe to call on every start; migrations already listed in
/// `_migration` are skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = applied_version(db).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(db, migration).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn schema_v1_defines_tree_columns() {
        for column in ["parent_id", "level", "path", "version"] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE FIELD {column} ON TABLE category")),
                "missing category.{column}"
            );
        }
    }

    #[test]
    fn schema_v1_defines_sibling_sets() {
        assert!(SCHEMA_V1.contains("DEFINE TABLE category_siblings"));
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
