//! Core domain model for the market-intelligence engine: categories,
//! upstream records, view shapes and the bundled fallback catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod fallback;
pub mod view;

pub use view::{
    AlertView, CategoryView, CompetitorView, InnovationView, MarketTrendView, OpportunityView,
    Severity, TrendDirection, IMPACT_SCORE_PLACEHOLDER, MATURITY_SCORE_PLACEHOLDER,
};

pub const CRATE_NAME: &str = "mktintel-core";

/// Dataset families the dashboard renders and the engine keeps in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Opportunities,
    MarketIntel,
    Alerts,
    Competitors,
    Innovations,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Opportunities,
        Category::MarketIntel,
        Category::Alerts,
        Category::Competitors,
        Category::Innovations,
    ];

    /// Categories populated by the seeder, in insertion order.
    pub const BASELINE: [Category; 3] = [
        Category::Alerts,
        Category::MarketIntel,
        Category::Opportunities,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Category::Opportunities => "opportunities",
            Category::MarketIntel => "market_intel",
            Category::Alerts => "alerts",
            Category::Competitors => "competitors",
            Category::Innovations => "innovations",
        }
    }

    /// Field of an upstream object that carries the record's natural key.
    pub fn natural_key_field(self) -> &'static str {
        match self {
            Category::Opportunities => "opportunity_id",
            Category::MarketIntel => "market_id",
            Category::Alerts => "alert_id",
            Category::Competitors => "competitor_id",
            Category::Innovations => "innovation_id",
        }
    }

    pub fn is_baseline(self) -> bool {
        Self::BASELINE.contains(&self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.slug() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordShapeError {
    #[error("{category} record is not a JSON object")]
    NotAnObject { category: Category },
    #[error("{category} record is missing string field `{field}`")]
    MissingKey {
        category: Category,
        field: &'static str,
    },
}

/// Externally sourced unit of data, identified by its natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub key: String,
    pub data: JsonValue,
    pub fetched_at: DateTime<Utc>,
}

impl RemoteRecord {
    /// Build a record from one upstream object, reading the category's natural key field.
    pub fn from_object(
        category: Category,
        data: JsonValue,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, RecordShapeError> {
        let object = data
            .as_object()
            .ok_or(RecordShapeError::NotAnObject { category })?;
        let field = category.natural_key_field();
        let key = object
            .get(field)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(RecordShapeError::MissingKey { category, field })?
            .to_string();
        Ok(Self {
            key,
            data,
            fetched_at,
        })
    }

    /// SHA-256 of the payload. `serde_json` maps serialize with sorted keys, so
    /// equal payloads hash equally regardless of upstream field order.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(&self.data).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}
