//! Toolshed server — application entry point.

use toolshed_catalog::{HierarchyConfig, HierarchyEngine};
use toolshed_db::repository::SurrealCategoryStore;
use toolshed_db::{DbConfig, DbManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toolshed=info".parse()?))
        .json()
        .init();

    tracing::info!("Starting toolshed server...");

    let db_config = DbConfig::from_env();
    let manager = DbManager::connect(&db_config).await?;
    toolshed_db::run_migrations(manager.client()).await?;

    let hierarchy_config = HierarchyConfig::from_env();
    tracing::info!(
        max_depth = hierarchy_config.max_depth,
        max_name_length = hierarchy_config.max_name_length,
        "Category hierarchy configured"
    );
    let engine = HierarchyEngine::new(
        SurrealCategoryStore::new(manager.client().clone()),
        hierarchy_config,
    );

    let roots = engine.get_root_categories().await?;
    tracing::info!(roots = roots.len(), "Category hierarchy ready");

    tracing::info!("Toolshed server stopped.");
    Ok(())
}
