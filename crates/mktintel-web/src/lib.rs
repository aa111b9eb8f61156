//! Axum + Askama dashboard over the engine's view adapters.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mktintel_core::{
    AlertView, CategoryView, CompetitorView, InnovationView, MarketTrendView, OpportunityView,
};
use mktintel_storage::StoreGateway;
use mktintel_sync::{
    load_dashboard, load_view, Engine, InitializationCoordinator, InitializationState, SyncState,
    ViewData,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "mktintel-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StoreGateway>,
    pub coordinator: Arc<InitializationCoordinator>,
}

impl AppState {
    pub fn from_engine(engine: &Engine) -> Self {
        Self {
            store: engine.store.clone(),
            coordinator: engine.coordinator.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub initialization: InitializationState,
    pub sync: SyncState,
}

#[derive(Debug, Clone)]
struct PanelRow {
    label: String,
    detail: String,
}

#[derive(Debug, Clone)]
struct Panel {
    title: &'static str,
    source: &'static str,
    rows: Vec<PanelRow>,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    status_line: String,
    sync_line: String,
    panels: Vec<Panel>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/api/status", get(status_handler))
        .route("/api/opportunities", get(view_handler::<OpportunityView>))
        .route("/api/market-intel", get(view_handler::<MarketTrendView>))
        .route("/api/alerts", get(view_handler::<AlertView>))
        .route("/api/competitors", get(view_handler::<CompetitorView>))
        .route("/api/innovations", get(view_handler::<InnovationView>))
        .route("/api/charts/regional-growth", get(regional_growth_chart_handler))
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` resolves. In-flight requests are drained first.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    Json(StatusBody {
        initialization: state.coordinator.state(),
        sync: state.coordinator.scheduler().state().await,
    })
}

async fn view_handler<V: CategoryView>(State(state): State<Arc<AppState>>) -> Json<ViewData<V>> {
    Json(load_view::<V>(state.store.as_ref()).await)
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let init = state.coordinator.state();
    let sync = state.coordinator.scheduler().state().await;
    let views = load_dashboard(state.store.as_ref()).await;

    let status_line = if init.is_loading {
        "Loading market data...".to_string()
    } else if let Some(err) = &init.error {
        format!("Initialization failed: {err}")
    } else if init.is_initialized {
        "Initialized".to_string()
    } else {
        "Not initialized".to_string()
    };
    let sync_line = match (sync.running, sync.last_run_at) {
        (false, _) => "Auto-sync stopped".to_string(),
        (true, None) => "Auto-sync running, no sync yet".to_string(),
        (true, Some(at)) => format!(
            "Auto-sync running, last sync {} ({} ok / {} failed / {} skipped)",
            at.format("%Y-%m-%d %H:%M UTC"),
            sync.ticks_completed,
            sync.ticks_failed,
            sync.ticks_skipped
        ),
    };

    let panels = vec![
        panel("Opportunities", &views.opportunities, |o| PanelRow {
            label: o.title.clone(),
            detail: format!(
                "{} / {}: ${:.1}bn, {:+.1}% growth, maturity {}",
                o.market, o.region, o.market_size_usd_bn, o.growth_rate_pct, o.maturity_score
            ),
        }),
        panel("Regional trends", &views.market_intel, |m| PanelRow {
            label: format!("{} / {}", m.region, m.segment),
            detail: format!("{:+.1}% ({:?})", m.growth_rate_pct, m.effective_trend()),
        }),
        panel("Alerts", &views.alerts, |a| PanelRow {
            label: a.title.clone(),
            detail: format!("{:?}: {}", a.severity, a.message),
        }),
        panel("Competitors", &views.competitors, |c| PanelRow {
            label: c.name.clone(),
            detail: match c.market_share_pct {
                Some(share) => format!("{share:.1}% share"),
                None => "share unknown".to_string(),
            },
        }),
        panel("Innovations", &views.innovations, |i| PanelRow {
            label: i.title.clone(),
            detail: format!("{}, impact {}", i.stage, i.impact_score),
        }),
    ];

    render_html(IndexTemplate {
        status_line,
        sync_line,
        panels,
    })
}

fn panel<T>(title: &'static str, data: &ViewData<T>, row: impl Fn(&T) -> PanelRow) -> Panel {
    Panel {
        title,
        source: if data.is_live() { "live" } else { "fallback" },
        rows: data.records().iter().map(row).collect(),
    }
}

/// Mean growth per region, as Plotly bar JSON.
async fn regional_growth_chart_handler(State(state): State<Arc<AppState>>) -> Response {
    let trends = load_view::<MarketTrendView>(state.store.as_ref()).await;
    let mut by_region = BTreeMap::<String, (f64, usize)>::new();
    for trend in trends.records() {
        let entry = by_region.entry(trend.region.clone()).or_default();
        entry.0 += trend.growth_rate_pct;
        entry.1 += 1;
    }
    let x = by_region.keys().cloned().collect::<Vec<_>>();
    let y = by_region
        .values()
        .map(|(sum, n)| sum / *n as f64)
        .collect::<Vec<_>>();
    let source = if trends.is_live() { "live" } else { "fallback" };
    Json(serde_json::json!({
        "data": [{
            "type": "bar",
            "x": x,
            "y": y,
            "marker": {"color": "#0ea5e9"}
        }],
        "layout": {
            "title": "Growth Rate by Region (%)",
            "paper_bgcolor": "#ffffff",
            "plot_bgcolor": "#f8fafc"
        },
        "source": source
    }))
    .into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
