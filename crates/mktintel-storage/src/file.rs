//! JSON-file backend: one `<category>.json` document per category under a root
//! directory, rewritten atomically on every upsert.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mktintel_core::{Category, RemoteRecord};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{RecordFilter, StoreError, StoreGateway};

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles; readers see whole files via rename.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_path(&self, category: Category) -> PathBuf {
        self.root.join(format!("{}.json", category.slug()))
    }

    async fn load(&self, category: Category) -> Result<BTreeMap<String, RemoteRecord>, StoreError> {
        let path = self.category_path(category);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let records: Vec<RemoteRecord> =
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        Ok(records.into_iter().map(|r| (r.key.clone(), r)).collect())
    }

    /// Write the category document via a temp file and rename so readers never see a partial file.
    async fn persist(
        &self,
        category: Category,
        table: &BTreeMap<String, RemoteRecord>,
    ) -> Result<(), StoreError> {
        let path = self.category_path(category);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;

        let rows: Vec<&RemoteRecord> = table.values().collect();
        let bytes = serde_json::to_vec_pretty(&rows)
            .map_err(|source| StoreError::Serialize { category, source })?;

        write_atomically(&self.root, &path, &bytes).await?;
        debug!(%category, rows = rows.len(), path = %path.display(), "persisted category file");
        Ok(())
    }
}

/// Write `bytes` to a temp file in `dir`, then rename it over `path`. The temp
/// file is removed on any failure.
async fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
    if let Err(err) = write_and_rename(&temp_path, path, bytes).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }
    Ok(())
}

async fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, source }
    };
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await
        .map_err(io_err(temp_path))?;
    file.write_all(bytes).await.map_err(io_err(temp_path))?;
    file.flush().await.map_err(io_err(temp_path))?;
    drop(file);
    fs::rename(temp_path, path).await.map_err(io_err(path))
}

#[async_trait]
impl StoreGateway for FileStore {
    async fn count(&self, category: Category) -> Result<u64, StoreError> {
        Ok(self.load(category).await?.len() as u64)
    }

    async fn upsert(&self, category: Category, records: &[RemoteRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut table = self.load(category).await?;
        for record in records {
            table.insert(record.key.clone(), record.clone());
        }
        self.persist(category, &table).await
    }

    async fn query(
        &self,
        category: Category,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        let table = self.load(category).await?;
        Ok(RecordFilter::apply(filter, table.values()))
    }
}
