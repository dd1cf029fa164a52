use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use version_store_service::{BackendKind, DatasetManager, ProfileStore};

/// Connects with either a named profile from the profile document or a raw
/// `DATABASE_URL`, then prints the catalog as a connectivity check.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "version_store_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting version store v0.1.0");

    let manager = if let Ok(profile_name) = std::env::var("VERSION_STORE_PROFILE") {
        let store_path = std::env::var("VERSION_STORE_PROFILES")
            .unwrap_or_else(|_| "connections.json".to_string());
        let store = ProfileStore::load(&store_path)?;
        let profile = store
            .get(&profile_name)
            .with_context(|| format!("no profile '{}' in {}", profile_name, store_path))?;
        info!("Connecting with profile '{}'", profile_name);
        DatasetManager::from_profile(profile).await?
    } else {
        let database_url =
            std::env::var("DATABASE_URL").context("set VERSION_STORE_PROFILE or DATABASE_URL")?;
        DatasetManager::new(&database_url, BackendKind::Postgres).await?
    };

    let datasets = manager.list_datasets().await?;
    info!("{} dataset(s) in this deployment", datasets.len());
    for dataset in datasets {
        let versions = manager.list_versions(&dataset.name).await?;
        println!(
            "{}  versions={}  created={}  {}",
            dataset.name,
            versions.len(),
            dataset.created_at.to_rfc3339(),
            dataset.description
        );
    }

    Ok(())
}
