//! SurrealDB implementation of [`CategoryStore`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use toolshed_core::error::ToolshedResult;
use toolshed_core::models::category::Category;
use toolshed_core::path::SEPARATOR;
use toolshed_core::repository::{CategoryStore, CategoryWrite, WriteBatch};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CONFLICT_MARKER, DUPLICATE_MARKER, DbError};

const SELECT_CATEGORY: &str = "SELECT meta::id(id) AS record_id, * FROM category";

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct CategoryRowWithId {
    record_id: String,
    name: String,
    description: String,
    parent_id: Option<String>,
    level: u32,
    path: String,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CategoryRowWithId {
    fn try_into_category(self) -> Result<Category, DbError> {
        let id = parse_uuid(&self.record_id, "category")?;
        let parent_id = self
            .parent_id
            .map(|p| parse_uuid(&p, "parent"))
            .transpose()?;
        Ok(Category {
            id,
            name: self.name,
            description: self.description,
            parent_id,
            level: self.level,
            path: self.path,
            children_count: 0,
            product_count: 0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Corrupt(format!("invalid {what} UUID {raw:?}: {e}")))
}

fn into_categories(rows: Vec<CategoryRowWithId>) -> Result<Vec<Category>, DbError> {
    rows.into_iter()
        .map(CategoryRowWithId::try_into_category)
        .collect()
}

fn in_sibling_order(mut rows: Vec<Category>) -> Vec<Category> {
    rows.sort_by(Category::sibling_order);
    rows
}

fn in_level_order(mut rows: Vec<Category>) -> Vec<Category> {
    rows.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.sibling_order(b)));
    rows
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct ChildCountRow {
    parent_id: Option<String>,
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct ProductCountRow {
    category_id: Option<String>,
    total: u64,
}

fn keyed_counts(
    rows: impl IntoIterator<Item = (Option<String>, u64)>,
) -> Result<HashMap<Uuid, u64>, DbError> {
    let mut counts = HashMap::new();
    for (key, total) in rows {
        if let Some(key) = key {
            counts.insert(parse_uuid(&key, "category")?, total);
        }
    }
    Ok(counts)
}

/// Key of the sibling set a [`CategoryWrite::Claim`] writes to.
fn sibling_scope(parent_id: Option<Uuid>) -> String {
    parent_id.map_or_else(|| "root".to_string(), |p| p.to_string())
}

/// Guarded SurrealQL statements for op number `i`.
///
/// Values are bound as `$<field>_<i>`; only ids, which are UUIDs, are
/// spliced into the THROW messages.
fn write_statements(i: usize, op: &CategoryWrite) -> String {
    let id = op.id();
    match op {
        CategoryWrite::Insert { parent_version, .. } => {
            let create = format!(
                "CREATE type::record('category', $id_{i}) SET \
                 name = $name_{i}, description = $description_{i}, \
                 parent_id = $parent_id_{i}, level = $level_{i}, \
                 path = $path_{i}, version = 0;\n"
            );
            match parent_version {
                Some(_) => format!(
                    "LET $parent_{i} = (UPDATE type::record('category', $parent_id_{i}) \
                     SET version += 1 WHERE version = $parent_version_{i}); \
                     IF array::len($parent_{i}) = 0 {{ THROW \"{CONFLICT_MARKER}: parent of {id} changed\"; }};\n\
                     {create}"
                ),
                None => create,
            }
        }
        CategoryWrite::Relocate { .. } => format!(
            "LET $moved_{i} = (UPDATE type::record('category', $id_{i}) SET \
             parent_id = $parent_id_{i}, level = $level_{i}, path = $path_{i}, \
             version += 1, updated_at = time::now() \
             WHERE version = $version_{i}); \
             IF array::len($moved_{i}) = 0 {{ THROW \"{CONFLICT_MARKER}: {id} changed since it was read\"; }};\n"
        ),
        CategoryWrite::Describe { .. } => format!(
            "LET $described_{i} = (UPDATE type::record('category', $id_{i}) SET \
             name = $name_{i}, description = $description_{i}, \
             version += 1, updated_at = time::now() \
             WHERE version = $version_{i}); \
             IF array::len($described_{i}) = 0 {{ THROW \"{CONFLICT_MARKER}: {id} changed since it was read\"; }};\n"
        ),
        CategoryWrite::Remove { .. } => format!(
            "LET $kids_{i} = (SELECT VALUE id FROM category WHERE parent_id = $id_{i} LIMIT 1); \
             IF array::len($kids_{i}) > 0 {{ THROW \"{CONFLICT_MARKER}: {id} gained children\"; }}; \
             LET $stock_{i} = (SELECT VALUE id FROM product WHERE category_id = $id_{i} LIMIT 1); \
             IF array::len($stock_{i}) > 0 {{ THROW \"{CONFLICT_MARKER}: {id} gained products\"; }}; \
             LET $gone_{i} = (DELETE type::record('category', $id_{i}) \
             WHERE version = $version_{i} RETURN BEFORE); \
             IF array::len($gone_{i}) = 0 {{ THROW \"{CONFLICT_MARKER}: {id} changed since it was read\"; }};\n"
        ),
        CategoryWrite::Guard { .. } => format!(
            "LET $seen_{i} = (SELECT VALUE version FROM type::record('category', $id_{i})); \
             IF $seen_{i} != [$version_{i}] {{ THROW \"{CONFLICT_MARKER}: {id} changed since it was read\"; }};\n"
        ),
        // The UPSERT makes concurrent claims on one sibling set write the
        // same key, so only one of them can commit.
        CategoryWrite::Claim { .. } => format!(
            "LET $clash_{i} = (SELECT VALUE id FROM category \
             WHERE parent_id = $parent_id_{i} \
             AND string::lowercase(name) = string::lowercase($name_{i}) \
             AND id != type::record('category', $id_{i}) LIMIT 1); \
             IF array::len($clash_{i}) > 0 {{ THROW \"{DUPLICATE_MARKER}: name of {id} is taken by a sibling\"; }}; \
             UPSERT type::record('category_siblings', $scope_{i}) SET claimed_at = time::now();\n"
        ),
    }
}

/// SurrealDB implementation of the category store.
#[derive(Clone)]
pub struct SurrealCategoryStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCategoryStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_many(
        &self,
        clause: &str,
        binds: Vec<(&'static str, String)>,
    ) -> Result<Vec<Category>, DbError> {
        let mut query = self.db.query(format!("{SELECT_CATEGORY} {clause}"));
        for bind in binds {
            query = query.bind(bind);
        }
        let mut result = query.await?;
        let rows: Vec<CategoryRowWithId> = result.take(0)?;
        into_categories(rows)
    }
}

impl<C: Connection> CategoryStore for SurrealCategoryStore<C> {
    async fn get_by_id(&self, id: Uuid) -> ToolshedResult<Category> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('category', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CategoryRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "category".into(),
            id: id_str,
        })?;

        row.try_into_category().map_err(Into::into)
    }

    async fn get_children(&self, parent_id: Uuid) -> ToolshedResult<Vec<Category>> {
        self.select_many(
            "WHERE parent_id = $parent_id",
            vec![("parent_id", parent_id.to_string())],
        )
        .await
        .map(in_sibling_order)
        .map_err(Into::into)
    }

    async fn get_roots(&self) -> ToolshedResult<Vec<Category>> {
        self.select_many(
            "WHERE parent_id = NONE",
            Vec::new(),
        )
        .await
        .map(in_sibling_order)
        .map_err(Into::into)
    }

    async fn get_subtree(&self, path: &str) -> ToolshedResult<Vec<Category>> {
        self.select_many(
            "WHERE path = $path OR string::starts_with(path, $prefix)",
            vec![
                ("path", path.to_string()),
                ("prefix", format!("{path}{SEPARATOR}")),
            ],
        )
        .await
        .map(in_level_order)
        .map_err(Into::into)
    }

    async fn get_all(&self) -> ToolshedResult<Vec<Category>> {
        self.select_many("", Vec::new())
            .await
            .map(in_level_order)
            .map_err(Into::into)
    }

    async fn count_children(&self, id: Uuid) -> ToolshedResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM category \
                 WHERE parent_id = $parent_id GROUP ALL",
            )
            .bind(("parent_id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn count_products(&self, id: Uuid) -> ToolshedResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM product \
                 WHERE category_id = $category_id GROUP ALL",
            )
            .bind(("category_id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn count_children_many(&self, ids: &[Uuid]) -> ToolshedResult<HashMap<Uuid, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let mut result = self
            .db
            .query(
                "SELECT parent_id, count() AS total FROM category \
                 WHERE parent_id IN $ids GROUP BY parent_id",
            )
            .bind(("ids", ids))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ChildCountRow> = result.take(0).map_err(DbError::from)?;

        keyed_counts(rows.into_iter().map(|r| (r.parent_id, r.total))).map_err(Into::into)
    }

    async fn count_products_many(&self, ids: &[Uuid]) -> ToolshedResult<HashMap<Uuid, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

        let mut result = self
            .db
            .query(
                "SELECT category_id, count() AS total FROM product \
                 WHERE category_id IN $ids GROUP BY category_id",
            )
            .bind(("ids", ids))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ProductCountRow> = result.take(0).map_err(DbError::from)?;

        keyed_counts(rows.into_iter().map(|r| (r.category_id, r.total))).map_err(Into::into)
    }

    async fn atomic_write(&self, batch: WriteBatch) -> ToolshedResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.into_ops();
        debug!(ops = ops.len(), "Committing category write batch");

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for (i, op) in ops.iter().enumerate() {
            sql.push_str(&write_statements(i, op));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self.db.query(sql);
        for (i, op) in ops.into_iter().enumerate() {
            query = match op {
                CategoryWrite::Insert {
                    category,
                    parent_version,
                } => {
                    let query = query
                        .bind((format!("id_{i}"), category.id.to_string()))
                        .bind((format!("name_{i}"), category.name))
                        .bind((format!("description_{i}"), category.description))
                        .bind((
                            format!("parent_id_{i}"),
                            category.parent_id.map(|p| p.to_string()),
                        ))
                        .bind((format!("level_{i}"), category.level))
                        .bind((format!("path_{i}"), category.path));
                    match parent_version {
                        Some(version) => query.bind((format!("parent_version_{i}"), version)),
                        None => query,
                    }
                }
                CategoryWrite::Relocate {
                    id,
                    expected_version,
                    parent_id,
                    level,
                    path,
                } => query
                    .bind((format!("id_{i}"), id.to_string()))
                    .bind((format!("version_{i}"), expected_version))
                    .bind((format!("parent_id_{i}"), parent_id.map(|p| p.to_string())))
                    .bind((format!("level_{i}"), level))
                    .bind((format!("path_{i}"), path)),
                CategoryWrite::Describe {
                    id,
                    expected_version,
                    name,
                    description,
                } => query
                    .bind((format!("id_{i}"), id.to_string()))
                    .bind((format!("version_{i}"), expected_version))
                    .bind((format!("name_{i}"), name))
                    .bind((format!("description_{i}"), description)),
                CategoryWrite::Remove {
                    id,
                    expected_version,
                }
                | CategoryWrite::Guard {
                    id,
                    expected_version,
                } => query
                    .bind((format!("id_{i}"), id.to_string()))
                    .bind((format!("version_{i}"), expected_version)),
                CategoryWrite::Claim {
                    id,
                    parent_id,
                    name,
                } => query
                    .bind((format!("id_{i}"), id.to_string()))
                    .bind((format!("parent_id_{i}"), parent_id.map(|p| p.to_string())))
                    .bind((format!("scope_{i}"), sibling_scope(parent_id)))
                    .bind((format!("name_{i}"), name)),
            };
        }

        let mut response = query
            .await
            .map_err(|e| DbError::from_write(e.to_string()))?;

        // A failed transaction cancels every statement; the guard that
        // threw may be any of them, so classify on all the errors.
        let mut errors: Vec<(usize, String)> = response
            .take_errors()
            .into_iter()
            .map(|(index, e)| (index, e.to_string()))
            .collect();
        if !errors.is_empty() {
            errors.sort_by_key(|(index, _)| *index);
            let message = errors
                .into_iter()
                .map(|(_, e)| e)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DbError::from_write(message).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(parent_id: Option<Uuid>) -> Category {
        let id = Uuid::new_v4();
        Category {
            id,
            name: "Fasteners".into(),
            description: String::new(),
            parent_id,
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
    fn root_insert_has_no_parent_guard() {
        let sql = write_statements(
            0,
            &CategoryWrite::Insert {
                category: sample(None),
                parent_version: None,
            },
        );
        assert!(!sql.contains("$parent_version_0"));
        assert!(sql.contains("CREATE type::record('category', $id_0)"));
    }

    #[test]
    fn child_insert_checks_parent_version() {
        let sql = write_statements(
            4,
            &CategoryWrite::Insert {
                category: sample(Some(Uuid::new_v4())),
                parent_version: Some(2),
            },
        );
        assert!(sql.contains("SET version += 1 WHERE version = $parent_version_4"));
        assert!(sql.contains(CONFLICT_MARKER));
        assert!(sql.find("UPDATE").unwrap() < sql.find("CREATE").unwrap());
    }

    #[test]
    fn remove_rechecks_references() {
        let id = Uuid::new_v4();
        let sql = write_statements(
            1,
            &CategoryWrite::Remove {
                id,
                expected_version: 7,
            },
        );
        assert!(sql.contains("FROM category WHERE parent_id = $id_1"));
        assert!(sql.contains("FROM product WHERE category_id = $id_1"));
        assert!(sql.contains(&format!("{CONFLICT_MARKER}: {id} changed since it was read")));
    }

    #[test]
    fn guard_only_reads() {
        let sql = write_statements(
            2,
            &CategoryWrite::Guard {
                id: Uuid::new_v4(),
                expected_version: 1,
            },
        );
        assert!(sql.contains("IF $seen_2 != [$version_2]"));
        assert!(!sql.contains("UPDATE"));
        assert!(!sql.contains("DELETE"));
    }

    #[test]
    fn claim_checks_siblings_and_touches_scope() {
        let sql = write_statements(
            3,
            &CategoryWrite::Claim {
                id: Uuid::new_v4(),
                parent_id: None,
                name: "Paint".into(),
            },
        );
        assert!(sql.contains("string::lowercase(name) = string::lowercase($name_3)"));
        assert!(sql.contains(DUPLICATE_MARKER));
        assert!(sql.contains("UPSERT type::record('category_siblings', $scope_3)"));
    }

    #[test]
    fn roots_share_one_sibling_scope() {
        let parent = Uuid::new_v4();
        assert_eq!(sibling_scope(None), "root");
        assert_eq!(sibling_scope(Some(parent)), parent.to_string());
    }

    #[test]
    fn keyed_counts_skip_missing_keys() {
        let id = Uuid::new_v4();
        let counts = keyed_counts([(Some(id.to_string()), 3), (None, 9)]).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&id], 3);

        assert!(keyed_counts([(Some("nope".to_string()), 1)]).is_err());
    }
}
