//! Shared handler state and store wiring.

use anyhow::{bail, Result};
use petpal_contracts::{
    CachedContractStore, ContractLifecycle, ContractStore, DirectorySeed, EntityDirectory,
    LifecycleConfig, MemoryContractStore, MemoryEntityDirectory, MemoryTemplateStore,
    SignatureCaptureFlow, TemplateSeed, TemplateStore,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ContractLifecycle>,
    pub signing: Arc<SignatureCaptureFlow>,
}

impl AppState {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        templates: Arc<dyn TemplateStore>,
        directory: Arc<dyn EntityDirectory>,
        config: LifecycleConfig,
    ) -> Self {
        // Every read and write goes through `contracts`; the projection only mirrors it
        let contracts: Arc<dyn ContractStore> = Arc::new(CachedContractStore::new(contracts));
        let lifecycle = Arc::new(ContractLifecycle::new(
            contracts, templates, directory, config,
        ));
        Self {
            signing: Arc::new(SignatureCaptureFlow::new(lifecycle.clone())),
            lifecycle,
        }
    }

    /// Wire stores from configuration and load seed data.
    pub async fn build(config: &ServerConfig) -> Result<Self> {
        let (contracts, templates) = stores(config).await?;
        let directory = Arc::new(MemoryEntityDirectory::new());

        if let Some(seed_dir) = &config.seed_dir {
            load_seed(seed_dir, templates.as_ref(), &directory).await?;
        }

        Ok(Self::new(
            contracts,
            templates,
            directory,
            config.lifecycle_config(),
        ))
    }
}

type Stores = (Arc<dyn ContractStore>, Arc<dyn TemplateStore>);

#[cfg(feature = "postgres")]
async fn stores(config: &ServerConfig) -> Result<Stores> {
    use anyhow::Context;
    use petpal_contracts::postgres::{migrate, PgContractStore, PgTemplateStore};
    use sqlx::postgres::PgPoolOptions;

    let Some(url) = &config.database_url else {
        return Ok(memory_stores());
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("Connecting to PETPAL_DATABASE_URL")?;
    migrate(&pool).await?;
    tracing::info!("Connected to database");

    let contracts: Arc<dyn ContractStore> = Arc::new(PgContractStore::new(pool.clone()));
    let templates: Arc<dyn TemplateStore> = Arc::new(PgTemplateStore::new(pool));
    Ok((contracts, templates))
}

#[cfg(not(feature = "postgres"))]
async fn stores(config: &ServerConfig) -> Result<Stores> {
    if config.database_url.is_some() {
        tracing::warn!("PETPAL_DATABASE_URL is set but postgres support is not built; using memory stores");
    }
    Ok(memory_stores())
}

fn memory_stores() -> Stores {
    tracing::info!("Using in-memory contract and template stores");
    (
        Arc::new(MemoryContractStore::new()),
        Arc::new(MemoryTemplateStore::new()),
    )
}

async fn load_seed(
    seed_dir: &Path,
    templates: &dyn TemplateStore,
    directory: &MemoryEntityDirectory,
) -> Result<()> {
    if !seed_dir.is_dir() {
        bail!("PETPAL_SEED_DIR {} is not a directory", seed_dir.display());
    }

    let template_dir = seed_dir.join("templates");
    if template_dir.is_dir() {
        TemplateSeed::seed(templates, &template_dir).await?;
    }

    let directory_file = seed_dir.join("directory.yaml");
    if directory_file.is_file() {
        let seed = DirectorySeed::load_file(&directory_file)?;
        if let Some(agency) = seed.agency {
            directory.set_agency(agency)?;
        }
        let (employees, clients) = (seed.employees.len(), seed.clients.len());
        for employee in seed.employees {
            directory.upsert_employee(employee)?;
        }
        for client in seed.clients {
            directory.upsert_client(client)?;
        }
        tracing::info!(employees, clients, "Loaded entity directory from {}", directory_file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use petpal_contracts::EntityKind;
    use std::path::PathBuf;

    fn bundled_seed() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seed")
    }

    #[tokio::test]
    async fn test_build_with_bundled_seed() {
        let config = ServerConfig {
            seed_dir: Some(bundled_seed()),
            ..Default::default()
        };
        let state = AppState::build(&config).await.unwrap();

        let templates = state
            .lifecycle
            .templates()
            .list(Some(EntityKind::Client), true)
            .await
            .unwrap();
        assert!(templates.iter().any(|t| t.id == "agenciamento"));
    }

    #[tokio::test]
    async fn test_missing_seed_dir_is_an_error() {
        let config = ServerConfig {
            seed_dir: Some(PathBuf::from("/nonexistent/petpal-seed")),
            ..Default::default()
        };
        assert!(AppState::build(&config).await.is_err());
    }
}
