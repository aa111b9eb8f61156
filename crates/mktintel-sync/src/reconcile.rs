//! Fetch → diff → upsert for a single category.

use std::collections::{BTreeMap, HashMap};

use mktintel_adapters::{SourceError, UpstreamSource};
use mktintel_core::{Category, RemoteRecord};
use mktintel_storage::{RecordFilter, StoreError, StoreGateway};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SyncTickError {
    #[error("fetching {category}: {source}")]
    Fetch {
        category: Category,
        #[source]
        source: SourceError,
    },
    #[error("committing {category}: {source}")]
    Store {
        category: Category,
        #[source]
        source: StoreError,
    },
}

impl SyncTickError {
    pub fn category(&self) -> Category {
        match self {
            SyncTickError::Fetch { category, .. } | SyncTickError::Store { category, .. } => {
                *category
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub fetched: usize,
    pub upserted: usize,
    pub unchanged: usize,
}

/// Upsert new and changed records. Stored records missing from the snapshot
/// are kept: one absent fetch is not evidence of deletion upstream.
pub async fn reconcile_category(
    store: &dyn StoreGateway,
    source: &dyn UpstreamSource,
    category: Category,
) -> Result<CategoryReport, SyncTickError> {
    let fetched = source
        .fetch(category)
        .await
        .map_err(|source| SyncTickError::Fetch { category, source })?;
    let fetched_count = fetched.len();

    // Duplicate keys within one snapshot: the last occurrence wins.
    let incoming: BTreeMap<String, RemoteRecord> =
        fetched.into_iter().map(|r| (r.key.clone(), r)).collect();
    if incoming.is_empty() {
        return Ok(CategoryReport {
            category,
            fetched: 0,
            upserted: 0,
            unchanged: 0,
        });
    }

    let filter = RecordFilter::keys(incoming.keys().cloned());
    let stored: HashMap<String, String> = store
        .query(category, Some(&filter))
        .await
        .map_err(|source| SyncTickError::Store { category, source })?
        .into_iter()
        .map(|r| {
            let hash = r.content_hash();
            (r.key, hash)
        })
        .collect();

    let distinct = incoming.len();
    let changed: Vec<RemoteRecord> = incoming
        .into_values()
        .filter(|r| stored.get(&r.key) != Some(&r.content_hash()))
        .collect();
    let unchanged = distinct - changed.len();

    if !changed.is_empty() {
        store
            .upsert(category, &changed)
            .await
            .map_err(|source| SyncTickError::Store { category, source })?;
    }
    debug!(%category, fetched = fetched_count, upserted = changed.len(), "reconciled category");

    Ok(CategoryReport {
        category,
        fetched: fetched_count,
        upserted: changed.len(),
        unchanged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, ScriptedSource};
    use mktintel_storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn only_new_and_changed_records_are_upserted() {
        let store = MemoryStore::new();
        store
            .upsert(
                Category::Competitors,
                &[
                    record(Category::Competitors, json!({"competitor_id": "c1", "name": "Same"})),
                    record(Category::Competitors, json!({"competitor_id": "c2", "name": "Old"})),
                ],
            )
            .await
            .unwrap();

        let source = ScriptedSource::new();
        source.set_snapshot(
            Category::Competitors,
            vec![
                record(Category::Competitors, json!({"competitor_id": "c1", "name": "Same"})),
                record(Category::Competitors, json!({"competitor_id": "c2", "name": "New"})),
                record(Category::Competitors, json!({"competitor_id": "c3", "name": "Fresh"})),
            ],
        );

        let report = reconcile_category(&store, &source, Category::Competitors)
            .await
            .unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.unchanged, 1);

        let rows = store.query(Category::Competitors, None).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].data["name"], "New");
    }

    #[tokio::test]
    async fn records_absent_upstream_are_not_deleted() {
        let store = MemoryStore::new();
        store
            .upsert(
                Category::Innovations,
                &[record(Category::Innovations, json!({"innovation_id": "gone", "title": "x"}))],
            )
            .await
            .unwrap();

        let source = ScriptedSource::new();
        source.set_snapshot(
            Category::Innovations,
            vec![record(Category::Innovations, json!({"innovation_id": "i2", "title": "y"}))],
        );
        reconcile_category(&store, &source, Category::Innovations)
            .await
            .unwrap();

        let keys: Vec<_> = store
            .query(Category::Innovations, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["gone".to_string(), "i2".to_string()]);
    }

    #[tokio::test]
    async fn fetch_failure_writes_nothing() {
        let store = MemoryStore::new();
        let source = ScriptedSource::new();
        source.fail(Category::Alerts);
        let err = reconcile_category(&store, &source, Category::Alerts)
            .await
            .unwrap_err();
        assert_eq!(err.category(), Category::Alerts);
        assert!(matches!(err, SyncTickError::Fetch { .. }));
        assert_eq!(store.count(Category::Alerts).await.unwrap(), 0);
    }
}
