//! Display-shaped records handed to the rendering layer.
//!
//! Stored payloads are mapped into these shapes with serde. Fields the store
//! does not track carry explicit defaults (see the `*_PLACEHOLDER` constants)
//! rather than being dropped.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{fallback, Category, RemoteRecord};

/// Stand-in maturity score for opportunities whose store row has none.
pub const MATURITY_SCORE_PLACEHOLDER: u8 = 50;
/// Stand-in impact score for innovations whose store row has none.
pub const IMPACT_SCORE_PLACEHOLDER: u8 = 50;

pub const DEFAULT_OPPORTUNITY_STATUS: &str = "tracking";
pub const DEFAULT_INNOVATION_STAGE: &str = "unclassified";

/// A view shape bound to one store category and its bundled fallback.
pub trait CategoryView: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const CATEGORY: Category;

    fn fallback() -> Vec<Self>;

    fn from_record(record: &RemoteRecord) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityView {
    pub opportunity_id: String,
    pub title: String,
    pub market: String,
    pub region: String,
    pub market_size_usd_bn: f64,
    pub growth_rate_pct: f64,
    #[serde(default = "default_maturity_score")]
    pub maturity_score: u8,
    #[serde(default = "default_opportunity_status")]
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Flat,
    Down,
}

impl TrendDirection {
    pub fn from_growth(growth_rate_pct: f64) -> Self {
        if growth_rate_pct > 0.5 {
            TrendDirection::Up
        } else if growth_rate_pct < -0.5 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        }
    }
}

/// Regional market trend row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrendView {
    pub market_id: String,
    pub region: String,
    pub segment: String,
    pub growth_rate_pct: f64,
    #[serde(default)]
    pub adoption_pct: Option<f64>,
    #[serde(default)]
    pub trend: Option<TrendDirection>,
}

impl MarketTrendView {
    /// Explicit trend, or one derived from the growth rate when the store has none.
    pub fn effective_trend(&self) -> TrendDirection {
        self.trend
            .unwrap_or_else(|| TrendDirection::from_growth(self.growth_rate_pct))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    pub alert_id: String,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorView {
    pub competitor_id: String,
    pub name: String,
    #[serde(default)]
    pub market_share_pct: Option<f64>,
    #[serde(default)]
    pub recent_moves: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnovationView {
    pub innovation_id: String,
    pub title: String,
    #[serde(default = "default_innovation_stage")]
    pub stage: String,
    #[serde(default = "default_impact_score")]
    pub impact_score: u8,
}

fn default_maturity_score() -> u8 {
    MATURITY_SCORE_PLACEHOLDER
}

fn default_impact_score() -> u8 {
    IMPACT_SCORE_PLACEHOLDER
}

fn default_opportunity_status() -> String {
    DEFAULT_OPPORTUNITY_STATUS.to_string()
}

fn default_innovation_stage() -> String {
    DEFAULT_INNOVATION_STAGE.to_string()
}

impl CategoryView for OpportunityView {
    const CATEGORY: Category = Category::Opportunities;

    fn fallback() -> Vec<Self> {
        fallback::opportunities()
    }
}

impl CategoryView for MarketTrendView {
    const CATEGORY: Category = Category::MarketIntel;

    fn fallback() -> Vec<Self> {
        fallback::regional_trends()
    }
}

impl CategoryView for AlertView {
    const CATEGORY: Category = Category::Alerts;

    fn fallback() -> Vec<Self> {
        fallback::alerts()
    }
}

impl CategoryView for CompetitorView {
    const CATEGORY: Category = Category::Competitors;

    fn fallback() -> Vec<Self> {
        fallback::competitors()
    }
}

impl CategoryView for InnovationView {
    const CATEGORY: Category = Category::Innovations;

    fn fallback() -> Vec<Self> {
        fallback::innovations()
    }
}
