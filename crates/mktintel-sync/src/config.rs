use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mktintel_adapters::{
    HttpClientConfig, RegistrySource, SourceRegistry, UpstreamSource,
};
use mktintel_storage::{FileStore, MemoryStore, PgStore, StoreGateway};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            other => bail!("unknown store backend `{other}` (expected memory, file or postgres)"),
        }
    }
}

/// Process configuration, read from the environment. The sync interval is
/// intentionally absent; see [`crate::SYNC_INTERVAL`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub data_dir: PathBuf,
    pub sources_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let store_backend = match lookup("MKTINTEL_STORE") {
            Some(value) => value.parse()?,
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::File,
        };
        Ok(Self {
            database_url,
            store_backend,
            data_dir: lookup("MKTINTEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            sources_path: lookup("MKTINTEL_SOURCES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./sources.yaml")),
            user_agent: lookup("MKTINTEL_USER_AGENT")
                .unwrap_or_else(|| "mktintel-sync/0.1".to_string()),
            http_timeout_secs: match lookup("MKTINTEL_HTTP_TIMEOUT_SECS") {
                Some(v) => v
                    .parse()
                    .with_context(|| format!("MKTINTEL_HTTP_TIMEOUT_SECS=`{v}` is not a number"))?,
                None => 20,
            },
            web_port: match lookup("MKTINTEL_WEB_PORT") {
                Some(v) => v
                    .parse()
                    .with_context(|| format!("MKTINTEL_WEB_PORT=`{v}` is not a port"))?,
                None => 8000,
            },
        })
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            ..HttpClientConfig::default()
        }
    }
}

pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn StoreGateway>> {
    let store: Arc<dyn StoreGateway> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::new(config.data_dir.clone())),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("MKTINTEL_STORE=postgres requires DATABASE_URL")?;
            Arc::new(
                PgStore::connect(url)
                    .await
                    .context("connecting to postgres")?,
            )
        }
    };
    info!(backend = ?config.store_backend, "store ready");
    Ok(store)
}

/// Build the upstream source from the registry file. A missing registry means
/// nothing is synced; the dashboard still renders from store and fallbacks.
pub fn build_source(config: &AppConfig) -> Result<Arc<dyn UpstreamSource>> {
    let registry = if config.sources_path.exists() {
        SourceRegistry::load(&config.sources_path)?
    } else {
        warn!(path = %config.sources_path.display(), "source registry not found; sync has no upstreams");
        SourceRegistry { sources: Vec::new() }
    };
    let base_dir = config
        .sources_path
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let source = RegistrySource::from_registry(&registry, base_dir, config.http_client_config())?;
    Ok(Arc::new(source))
}
