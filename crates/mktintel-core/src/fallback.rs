//! Bundled snapshots rendered whenever live data is missing, empty or unreadable.
//!
//! These change only with a deployment.

use crate::view::{
    AlertView, CompetitorView, InnovationView, MarketTrendView, OpportunityView, Severity,
    TrendDirection,
};

pub fn opportunities() -> Vec<OpportunityView> {
    vec![
        OpportunityView {
            opportunity_id: "opp-edge-ai-retail".into(),
            title: "Edge AI for in-store analytics".into(),
            market: "Retail technology".into(),
            region: "North America".into(),
            market_size_usd_bn: 8.4,
            growth_rate_pct: 21.3,
            maturity_score: 62,
            status: "validated".into(),
        },
        OpportunityView {
            opportunity_id: "opp-cold-chain-iot".into(),
            title: "Cold-chain IoT monitoring".into(),
            market: "Logistics".into(),
            region: "Europe".into(),
            market_size_usd_bn: 5.1,
            growth_rate_pct: 14.8,
            maturity_score: 71,
            status: "tracking".into(),
        },
        OpportunityView {
            opportunity_id: "opp-agri-drones".into(),
            title: "Precision agriculture drones".into(),
            market: "AgTech".into(),
            region: "Asia Pacific".into(),
            market_size_usd_bn: 3.7,
            growth_rate_pct: 26.9,
            maturity_score: 44,
            status: "emerging".into(),
        },
    ]
}

pub fn regional_trends() -> Vec<MarketTrendView> {
    vec![
        MarketTrendView {
            market_id: "na-enterprise-ai".into(),
            region: "North America".into(),
            segment: "Enterprise AI".into(),
            growth_rate_pct: 18.2,
            adoption_pct: Some(64.0),
            trend: Some(TrendDirection::Up),
        },
        MarketTrendView {
            market_id: "eu-industrial-iot".into(),
            region: "Europe".into(),
            segment: "Industrial IoT".into(),
            growth_rate_pct: 9.6,
            adoption_pct: Some(48.5),
            trend: Some(TrendDirection::Up),
        },
        MarketTrendView {
            market_id: "apac-robotics".into(),
            region: "Asia Pacific".into(),
            segment: "Service robotics".into(),
            growth_rate_pct: 23.4,
            adoption_pct: Some(37.2),
            trend: Some(TrendDirection::Up),
        },
        MarketTrendView {
            market_id: "latam-fintech".into(),
            region: "Latin America".into(),
            segment: "Embedded finance".into(),
            growth_rate_pct: 0.3,
            adoption_pct: Some(29.0),
            trend: Some(TrendDirection::Flat),
        },
    ]
}

pub fn alerts() -> Vec<AlertView> {
    vec![
        AlertView {
            alert_id: "alert-pricing-pressure".into(),
            title: "Pricing pressure in mid-market SaaS".into(),
            severity: Severity::High,
            message: "Three competitors cut list prices by 15-20% this quarter.".into(),
            detected_at: None,
        },
        AlertView {
            alert_id: "alert-eu-regulation".into(),
            title: "EU AI Act compliance deadline".into(),
            severity: Severity::Medium,
            message: "High-risk system obligations take effect within 12 months.".into(),
            detected_at: None,
        },
        AlertView {
            alert_id: "alert-supply-chip".into(),
            title: "Accelerator supply tightening".into(),
            severity: Severity::Low,
            message: "Lead times for datacenter GPUs lengthened by two weeks.".into(),
            detected_at: None,
        },
    ]
}

pub fn competitors() -> Vec<CompetitorView> {
    vec![
        CompetitorView {
            competitor_id: "comp-northwind".into(),
            name: "Northwind Analytics".into(),
            market_share_pct: Some(22.5),
            recent_moves: vec!["Acquired a computer-vision startup".into()],
        },
        CompetitorView {
            competitor_id: "comp-contoso".into(),
            name: "Contoso Insights".into(),
            market_share_pct: Some(17.0),
            recent_moves: vec!["Launched usage-based pricing".into()],
        },
        CompetitorView {
            competitor_id: "comp-fabrikam".into(),
            name: "Fabrikam Data".into(),
            market_share_pct: Some(9.8),
            recent_moves: Vec::new(),
        },
    ]
}

pub fn innovations() -> Vec<InnovationView> {
    vec![
        InnovationView {
            innovation_id: "inno-small-models".into(),
            title: "On-device small language models".into(),
            stage: "early adoption".into(),
            impact_score: 78,
        },
        InnovationView {
            innovation_id: "inno-digital-twins".into(),
            title: "Factory digital twins".into(),
            stage: "growth".into(),
            impact_score: 66,
        },
        InnovationView {
            innovation_id: "inno-solid-state".into(),
            title: "Solid-state batteries".into(),
            stage: "research".into(),
            impact_score: 83,
        },
    ]
}
