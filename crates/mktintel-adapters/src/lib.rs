//! Upstream source contract and the registry-driven source used by the sync loop.
//!
//! A source returns the full current snapshot for one category. Any record
//! without a usable natural key fails the whole category fetch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mktintel_core::{Category, RecordShapeError, RemoteRecord};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub mod http;

pub use http::{BackoffPolicy, FetchError, HttpClientConfig, HttpFetcher, TokenBucketConfig};

pub const CRATE_NAME: &str = "mktintel-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no upstream configured for {0}")]
    NotConfigured(Category),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{category} payload must be an array of objects or {{\"records\": [...]}}")]
    Shape { category: Category },
    #[error(transparent)]
    Record(#[from] RecordShapeError),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Categories this source can serve, in the order a sync tick should visit them.
    fn categories(&self) -> Vec<Category>;

    async fn fetch(&self, category: Category) -> Result<Vec<RemoteRecord>, SourceError>;
}

/// Turn one upstream payload into records. Accepts a bare array or an object
/// wrapping the array under `records`.
pub fn parse_snapshot(
    category: Category,
    payload: JsonValue,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<RemoteRecord>, SourceError> {
    let items = match payload {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("records") {
            Some(JsonValue::Array(items)) => items,
            _ => return Err(SourceError::Shape { category }),
        },
        _ => return Err(SourceError::Shape { category }),
    };
    items
        .into_iter()
        .map(|item| RemoteRecord::from_object(category, item, fetched_at).map_err(Into::into))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Http,
    Fixture,
}

/// One entry of `sources.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub category: Category,
    pub mode: SourceMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRoute {
    Http { url: String },
    Fixture { path: PathBuf },
}

/// Routes each category to the HTTP endpoint or fixture file named in the registry.
#[derive(Debug)]
pub struct RegistrySource {
    routes: BTreeMap<Category, SourceRoute>,
    http: Option<Arc<HttpFetcher>>,
}

impl RegistrySource {
    /// Relative fixture paths resolve against `base_dir`. Disabled entries are skipped;
    /// a later entry for the same category replaces an earlier one.
    pub fn from_registry(
        registry: &SourceRegistry,
        base_dir: &Path,
        http_config: HttpClientConfig,
    ) -> anyhow::Result<Self> {
        let mut routes = BTreeMap::new();
        for source in registry.sources.iter().filter(|s| s.enabled) {
            let route = match source.mode {
                SourceMode::Http => SourceRoute::Http {
                    url: source
                        .url
                        .clone()
                        .with_context(|| format!("http source for {} has no url", source.category))?,
                },
                SourceMode::Fixture => {
                    let path = source.path.clone().with_context(|| {
                        format!("fixture source for {} has no path", source.category)
                    })?;
                    SourceRoute::Fixture {
                        path: if path.is_absolute() {
                            path
                        } else {
                            base_dir.join(path)
                        },
                    }
                }
            };
            routes.insert(source.category, route);
        }

        let http = if routes.values().any(|r| matches!(r, SourceRoute::Http { .. })) {
            Some(Arc::new(HttpFetcher::new(http_config)?))
        } else {
            None
        };
        Ok(Self { routes, http })
    }

    pub fn route(&self, category: Category) -> Option<&SourceRoute> {
        self.routes.get(&category)
    }
}

#[async_trait]
impl UpstreamSource for RegistrySource {
    fn categories(&self) -> Vec<Category> {
        self.routes.keys().copied().collect()
    }

    async fn fetch(&self, category: Category) -> Result<Vec<RemoteRecord>, SourceError> {
        let fetched_at = Utc::now();
        let payload = match (self.routes.get(&category), &self.http) {
            (Some(SourceRoute::Http { url }), Some(http)) => {
                http.fetch_json(Uuid::new_v4(), category, url).await?
            }
            (Some(SourceRoute::Fixture { path }), _) => read_fixture(path).await?,
            _ => return Err(SourceError::NotConfigured(category)),
        };
        let records = parse_snapshot(category, payload, fetched_at)?;
        debug!(%category, records = records.len(), "fetched upstream snapshot");
        Ok(records)
    }
}

async fn read_fixture(path: &Path) -> Result<JsonValue, SourceError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const REGISTRY: &str = r#"
sources:
  - category: market_intel
    mode: fixture
    path: market_intel.json
  - category: competitors
    mode: fixture
    path: competitors.json
    enabled: false
  - category: innovations
    mode: http
    url: https://example.invalid/innovations
"#;

    #[test]
    fn snapshot_accepts_bare_and_wrapped_arrays() {
        let now = Utc::now();
        let bare = parse_snapshot(
            Category::Innovations,
            json!([{"innovation_id": "i1", "title": "x"}]),
            now,
        )
        .unwrap();
        let wrapped = parse_snapshot(
            Category::Innovations,
            json!({"records": [{"innovation_id": "i1", "title": "x"}]}),
            now,
        )
        .unwrap();
        assert_eq!(bare, wrapped);
        assert!(matches!(
            parse_snapshot(Category::Innovations, json!({"items": []}), now),
            Err(SourceError::Shape { .. })
        ));
    }

    #[test]
    fn one_malformed_record_fails_the_whole_fetch() {
        let err = parse_snapshot(
            Category::Competitors,
            json!([{"competitor_id": "c1", "name": "ok"}, {"name": "no key"}]),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::Record(_)));
    }

    #[tokio::test]
    async fn registry_routes_enabled_categories_only() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("market_intel.json"),
            serde_json::to_vec(&json!([
                {"market_id": "eu-iot", "region": "Europe", "segment": "IoT", "growth_rate_pct": 9.6}
            ]))
            .unwrap(),
        )
        .unwrap();

        let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
        let source =
            RegistrySource::from_registry(&registry, dir.path(), HttpClientConfig::default())
                .unwrap();

        assert_eq!(
            source.categories(),
            vec![Category::MarketIntel, Category::Innovations]
        );
        let records = source.fetch(Category::MarketIntel).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "eu-iot");
        assert!(matches!(
            source.fetch(Category::Competitors).await,
            Err(SourceError::NotConfigured(Category::Competitors))
        ));
    }

    #[tokio::test]
    async fn missing_fixture_is_an_io_error() {
        let dir = tempdir().expect("tempdir");
        let registry = SourceRegistry::from_yaml_str(REGISTRY).unwrap();
        let source =
            RegistrySource::from_registry(&registry, dir.path(), HttpClientConfig::default())
                .unwrap();
        assert!(matches!(
            source.fetch(Category::MarketIntel).await,
            Err(SourceError::Io { .. })
        ));
    }
}
