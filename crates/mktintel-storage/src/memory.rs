use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use mktintel_core::{Category, RemoteRecord};
use tokio::sync::RwLock;

use crate::{RecordFilter, StoreError, StoreGateway};

/// Process-local store. Used for tests and for running the dashboard without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Category, BTreeMap<String, RemoteRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn count(&self, category: Category) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&category).map_or(0, |t| t.len() as u64))
    }

    async fn upsert(&self, category: Category, records: &[RemoteRecord]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(category).or_default();
        for record in records {
            table.insert(record.key.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        category: Category,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&category)
            .map(|t| RecordFilter::apply(filter, t.values()))
            .unwrap_or_default())
    }
}
