//! One-time population of the baseline categories.
//!
//! A category is seeded only when its count is zero. Categories are inserted
//! in [`Category::BASELINE`] order and are independent of each other, so a
//! failure part-way leaves earlier categories in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use mktintel_adapters::parse_snapshot;
use mktintel_core::{Category, RemoteRecord};
use mktintel_storage::{StoreError, StoreGateway};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const ALERTS_BASELINE: &str = include_str!("../seed/alerts.json");
const MARKET_INTEL_BASELINE: &str = include_str!("../seed/market_intel.json");
const OPPORTUNITIES_BASELINE: &str = include_str!("../seed/opportunities.json");

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("reading seed summary: {0}")]
    Summary(#[source] StoreError),
    #[error("seeding {category} failed ({} categories seeded before it): {source}", .seeded.len())]
    Store {
        category: Category,
        seeded: Vec<Category>,
        #[source]
        source: StoreError,
    },
    #[error("bundled baseline for {category} is malformed: {message}")]
    Baseline { category: Category, message: String },
}

/// Baseline record counts as the store reports them right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub counts: BTreeMap<Category, u64>,
}

impl SeedSummary {
    pub fn count(&self, category: Category) -> u64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn empty_categories(&self) -> Vec<Category> {
        Category::BASELINE
            .into_iter()
            .filter(|c| self.count(*c) == 0)
            .collect()
    }

    pub fn is_fully_seeded(&self) -> bool {
        self.empty_categories().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Categories inserted by this call, with the number of rows written.
    pub seeded: Vec<(Category, usize)>,
    /// Categories that already held rows.
    pub skipped: Vec<Category>,
}

impl SeedReport {
    pub fn is_noop(&self) -> bool {
        self.seeded.is_empty()
    }

    pub fn seeded_categories(&self) -> Vec<Category> {
        self.seeded.iter().map(|(c, _)| *c).collect()
    }
}

/// Parse the baseline records compiled into this crate.
pub fn bundled_baseline(category: Category) -> Result<Vec<RemoteRecord>, SeedError> {
    let raw = match category {
        Category::Alerts => ALERTS_BASELINE,
        Category::MarketIntel => MARKET_INTEL_BASELINE,
        Category::Opportunities => OPPORTUNITIES_BASELINE,
        other => {
            return Err(SeedError::Baseline {
                category: other,
                message: "not a baseline category".to_string(),
            })
        }
    };
    let payload = serde_json::from_str(raw).map_err(|err| SeedError::Baseline {
        category,
        message: err.to_string(),
    })?;
    parse_snapshot(category, payload, Utc::now()).map_err(|err| SeedError::Baseline {
        category,
        message: err.to_string(),
    })
}

#[derive(Clone)]
pub struct Seeder {
    store: Arc<dyn StoreGateway>,
}

impl Seeder {
    pub fn new(store: Arc<dyn StoreGateway>) -> Self {
        Self { store }
    }

    pub async fn summary(&self) -> Result<SeedSummary, StoreError> {
        let mut counts = BTreeMap::new();
        for category in Category::BASELINE {
            counts.insert(category, self.store.count(category).await?);
        }
        Ok(SeedSummary { counts })
    }

    pub async fn seed_database(&self) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();
        for category in Category::BASELINE {
            let existing = match self.store.count(category).await {
                Ok(n) => n,
                Err(source) => {
                    return Err(SeedError::Store {
                        category,
                        seeded: report.seeded_categories(),
                        source,
                    })
                }
            };
            if existing > 0 {
                report.skipped.push(category);
                continue;
            }

            let records = bundled_baseline(category)?;
            if let Err(source) = self.store.upsert(category, &records).await {
                warn!(%category, error = %source, "baseline insert failed");
                return Err(SeedError::Store {
                    category,
                    seeded: report.seeded_categories(),
                    source,
                });
            }
            info!(%category, rows = records.len(), "seeded baseline category");
            report.seeded.push((category, records.len()));
        }
        Ok(report)
    }
}
