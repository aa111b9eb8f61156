//! Store gateway contract and its backends.
//!
//! The engine only ever talks to persistence through [`StoreGateway`]:
//! per-category counts, insert-or-replace upserts keyed by natural key, and
//! filtered reads.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use mktintel_core::{Category, RemoteRecord};
use thiserror::Error;

mod file;
mod memory;
mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "mktintel-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serializing {category} records: {source}")]
    Serialize {
        category: Category,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Optional narrowing for [`StoreGateway::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only return these natural keys. Empty means no key restriction.
    pub keys: Vec<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn keys(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply the filter to records already ordered by key.
    pub(crate) fn apply<'a>(
        filter: Option<&Self>,
        records: impl Iterator<Item = &'a RemoteRecord>,
    ) -> Vec<RemoteRecord> {
        let Some(filter) = filter else {
            return records.cloned().collect();
        };
        let wanted: HashSet<&str> = filter.keys.iter().map(String::as_str).collect();
        let matching = records
            .filter(|r| wanted.is_empty() || wanted.contains(r.key.as_str()))
            .cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn count(&self, category: Category) -> Result<u64, StoreError>;

    /// Insert-or-replace each record by its natural key. Records not named are left untouched.
    async fn upsert(&self, category: Category, records: &[RemoteRecord]) -> Result<(), StoreError>;

    /// Records of a category ordered by natural key.
    async fn query(
        &self,
        category: Category,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<RemoteRecord>, StoreError>;
}
