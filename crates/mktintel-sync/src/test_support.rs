//! Store and source doubles shared by the engine tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mktintel_adapters::{SourceError, UpstreamSource};
use mktintel_core::{Category, RemoteRecord};
use mktintel_storage::{MemoryStore, RecordFilter, StoreError, StoreGateway};
use serde_json::Value as JsonValue;

pub fn record(category: Category, data: JsonValue) -> RemoteRecord {
    RemoteRecord::from_object(category, data, Utc::now()).unwrap()
}

/// Memory store with switchable read, count and write failures, a write counter and optional slow counts.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_upserts: Mutex<HashSet<Category>>,
    failing_queries: AtomicBool,
    failing_counts: AtomicBool,
    upserts: AtomicUsize,
    count_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_upserts_for(&self, category: Category) {
        self.failing_upserts.lock().unwrap().insert(category);
    }

    pub fn fail_queries(&self) {
        self.failing_queries.store(true, Ordering::SeqCst);
    }

    pub fn fail_counts(&self) {
        self.failing_counts.store(true, Ordering::SeqCst);
    }

    pub fn delay_counts(&self, delay: Duration) {
        *self.count_delay.lock().unwrap() = Some(delay);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreGateway for FlakyStore {
    async fn count(&self, category: Category) -> Result<u64, StoreError> {
        let delay = *self.count_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_counts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("count timed out".to_string()));
        }
        self.inner.count(category).await
    }

    async fn upsert(&self, category: Category, records: &[RemoteRecord]) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.failing_upserts.lock().unwrap().contains(&category) {
            return Err(StoreError::Unavailable(format!("{category} table locked")));
        }
        self.inner.upsert(category, records).await
    }

    async fn query(
        &self,
        category: Category,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.query(category, filter).await
    }
}

/// Upstream double serving fixed snapshots, with failures, latency and a
/// concurrency high-water mark.
#[derive(Default)]
pub struct ScriptedSource {
    snapshots: Mutex<BTreeMap<Category, Vec<RemoteRecord>>>,
    failing: Mutex<BTreeSet<Category>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, category: Category, records: Vec<RemoteRecord>) {
        self.snapshots.lock().unwrap().insert(category, records);
    }

    pub fn fail(&self, category: Category) {
        self.failing.lock().unwrap().insert(category);
    }

    pub fn recover(&self, category: Category) {
        self.failing.lock().unwrap().remove(&category);
    }

    pub fn delay_fetches(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for ScriptedSource {
    fn categories(&self) -> Vec<Category> {
        let mut categories: BTreeSet<Category> =
            self.snapshots.lock().unwrap().keys().copied().collect();
        categories.extend(self.failing.lock().unwrap().iter().copied());
        categories.into_iter().collect()
    }

    async fn fetch(&self, category: Category) -> Result<Vec<RemoteRecord>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&category) {
            return Err(SourceError::Shape { category });
        }
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&category)
            .cloned()
            .unwrap_or_default())
    }
}
