//! Read path for presentational features.
//!
//! Every feature reads its category through [`load_view`], which never fails:
//! an empty category, a store error or an unmappable record yields the
//! bundled fallback, tagged as such.

use mktintel_core::{
    AlertView, CategoryView, CompetitorView, InnovationView, MarketTrendView, OpportunityView,
};
use mktintel_storage::StoreGateway;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "records", rename_all = "lowercase")]
pub enum ViewData<T> {
    Live(Vec<T>),
    Fallback(Vec<T>),
}

impl<T> ViewData<T> {
    pub fn records(&self) -> &[T] {
        match self {
            ViewData::Live(records) | ViewData::Fallback(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<T> {
        match self {
            ViewData::Live(records) | ViewData::Fallback(records) => records,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ViewData::Live(_))
    }
}

pub async fn load_view<V: CategoryView>(store: &dyn StoreGateway) -> ViewData<V> {
    let category = V::CATEGORY;
    let records = match store.query(category, None).await {
        Ok(records) => records,
        Err(err) => {
            warn!(%category, error = %err, "store read failed; serving fallback");
            return ViewData::Fallback(V::fallback());
        }
    };
    if records.is_empty() {
        debug!(%category, "no stored records; serving fallback");
        return ViewData::Fallback(V::fallback());
    }
    match records.iter().map(V::from_record).collect::<Result<Vec<_>, _>>() {
        Ok(views) => ViewData::Live(views),
        Err(err) => {
            warn!(%category, error = %err, "stored record does not fit view; serving fallback");
            ViewData::Fallback(V::fallback())
        }
    }
}

/// Every dashboard panel, each resolved independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardViews {
    pub opportunities: ViewData<OpportunityView>,
    pub market_intel: ViewData<MarketTrendView>,
    pub alerts: ViewData<AlertView>,
    pub competitors: ViewData<CompetitorView>,
    pub innovations: ViewData<InnovationView>,
}

pub async fn load_dashboard(store: &dyn StoreGateway) -> DashboardViews {
    let (opportunities, market_intel, alerts, competitors, innovations) = tokio::join!(
        load_view::<OpportunityView>(store),
        load_view::<MarketTrendView>(store),
        load_view::<AlertView>(store),
        load_view::<CompetitorView>(store),
        load_view::<InnovationView>(store),
    );
    DashboardViews {
        opportunities,
        market_intel,
        alerts,
        competitors,
        innovations,
    }
}
