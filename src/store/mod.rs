pub mod models;

pub use models::{Overlay, OverlayFields, OverlayKind, StreamSetting, StreamSettingFields};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

/// A record persisted by [`RecordStore`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);
}

#[derive(Debug)]
struct Table<T> {
    records: BTreeMap<u64, T>,
    next_id: u64,
}

/// On-disk layout of a store file. `next_id` is kept so an id freed by the
/// newest record's deletion is not handed out again after a restart.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile<R> {
    next_id: u64,
    records: Vec<R>,
}

/// Records keyed by an auto-increment id, persisted as a JSON document.
///
/// Every mutation is written to a copy of the table first and only becomes
/// visible once the file has been saved.
#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    path: PathBuf,
    table: Arc<TokioMutex<Table<T>>>,
}

impl<T: Record> RecordStore<T> {
    /// Opens `<workspace>/<file>`, loading any records saved by a previous run.
    ///
    /// A file that does not parse is an error; it is left in place untouched.
    pub fn open(workspace: &Path, file: &str) -> anyhow::Result<Self> {
        let path = workspace.join(file);
        let stored: StoreFile<T> = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .inspect_err(|error| {
                    error!(?error, ?path, "Failed to parse records file.");
                })
                .with_context(|| format!("corrupt records file {}", path.display()))?
        } else {
            StoreFile {
                next_id: 1,
                records: Vec::new(),
            }
        };

        let records = stored
            .records
            .into_iter()
            .map(|record| (record.id(), record))
            .collect::<BTreeMap<_, _>>();
        let next_id = records
            .keys()
            .next_back()
            .map_or(1, |id| id + 1)
            .max(stored.next_id);

        info!(
            count = records.len(),
            file = %path.display(),
            "Initialize record store"
        );

        Ok(Self {
            path,
            table: Arc::new(TokioMutex::new(Table { records, next_id })),
        })
    }

    fn temp_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        PathBuf::from(path)
    }

    /// Writes `records` to a temp file and renames it over the store file, so
    /// the file on disk is always either the old or the new table.
    async fn save(&self, records: &BTreeMap<u64, T>, next_id: u64) -> anyhow::Result<()> {
        let file = StoreFile {
            next_id,
            records: records.values().collect::<Vec<_>>(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        debug!(path = %self.path.display(), count = file.records.len(), "Saving records to file");

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, content)
            .await
            .with_context(|| format!("failed to write {}", temp_path.display()))?;

        if let Err(error) = tokio::fs::rename(&temp_path, &self.path).await {
            warn!(?error, path = %self.path.display(), "Failed to replace records file");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(anyhow::Error::new(error)
                .context(format!("failed to replace {}", self.path.display())));
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<T> {
        self.table.lock().await.records.values().cloned().collect()
    }

    pub async fn get(&self, id: u64) -> Option<T> {
        self.table.lock().await.records.get(&id).cloned()
    }

    /// Assigns the next id to `record`, stores and returns it.
    pub async fn insert(&self, mut record: T) -> anyhow::Result<T> {
        let mut table = self.table.lock().await;
        let id = table.next_id;
        record.set_id(id);

        let mut records = table.records.clone();
        records.insert(id, record.clone());
        self.save(&records, id + 1).await?;

        table.records = records;
        table.next_id = id + 1;
        debug!(id, "Record inserted");
        Ok(record)
    }

    /// Applies `update` to the record with `id`. `Ok(None)` if there is no such record.
    pub async fn update<F>(&self, id: u64, update: F) -> anyhow::Result<Option<T>>
    where
        F: FnOnce(&mut T),
    {
        let mut table = self.table.lock().await;
        let Some(current) = table.records.get(&id) else {
            return Ok(None);
        };

        let mut record = current.clone();
        update(&mut record);
        record.set_id(id);

        let mut records = table.records.clone();
        records.insert(id, record.clone());
        self.save(&records, table.next_id).await?;

        table.records = records;
        debug!(id, "Record updated");
        Ok(Some(record))
    }

    /// Removes the record with `id`, reporting whether it existed.
    pub async fn remove(&self, id: u64) -> anyhow::Result<bool> {
        let mut table = self.table.lock().await;
        if !table.records.contains_key(&id) {
            return Ok(false);
        }

        let mut records = table.records.clone();
        records.remove(&id);
        self.save(&records, table.next_id).await?;

        table.records = records;
        debug!(id, "Record removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("store-test-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn setting(name: &str) -> StreamSetting {
        StreamSetting::new(
            "rtsp://camera.local/stream".into(),
            name.into(),
            true,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let dir = workspace();
        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();

        let first = store.insert(setting("front door")).await.unwrap();
        let second = store.insert(setting("backyard")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        // ids are not reused after deletion
        assert!(store.remove(2).await.unwrap());
        let third = store.insert(setting("garage")).await.unwrap();
        assert_eq!(third.id, 3);

        let names = store
            .list()
            .await
            .into_iter()
            .map(|s| s.stream_name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["front door", "garage"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_reload_from_file() {
        let dir = workspace();
        {
            let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
            store.insert(setting("front door")).await.unwrap();
            store.insert(setting("backyard")).await.unwrap();
        }

        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
        assert_eq!(store.list().await.len(), 2);
        assert_eq!(store.get(2).await.unwrap().stream_name, "backyard");

        let next = store.insert(setting("garage")).await.unwrap();
        assert_eq!(next.id, 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_update_and_remove_missing() {
        let dir = workspace();
        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();

        assert!(store.update(7, |s| s.is_active = false).await.unwrap().is_none());
        assert!(!store.remove(7).await.unwrap());

        store.insert(setting("front door")).await.unwrap();
        let updated = store
            .update(1, |s| s.is_active = false)
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);
        assert!(!store.get(1).await.unwrap().is_active);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected_and_kept() {
        let dir = workspace();
        {
            let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
            store.insert(setting("lobby")).await.unwrap();
            store.insert(setting("backyard")).await.unwrap();
        }

        // a save cut short halfway through the second record
        let saved = fs::read_to_string(dir.join("streams.json")).unwrap();
        let truncated = &saved[..saved.len() * 3 / 4];
        fs::write(dir.join("streams.json"), truncated).unwrap();

        assert!(RecordStore::<StreamSetting>::open(&dir, "streams.json").is_err());
        assert_eq!(fs::read_to_string(dir.join("streams.json")).unwrap(), truncated);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_replaces_file_without_leftovers() {
        let dir = workspace();
        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
        store.insert(setting("lobby")).await.unwrap();
        store.insert(setting("backyard")).await.unwrap();

        // a temp file left by an interrupted save does not affect the store
        fs::write(dir.join("streams.json.tmp"), "[{\"id\": 1,").unwrap();
        store.remove(2).await.unwrap();

        assert!(!dir.join("streams.json.tmp").exists());
        let saved: StoreFile<StreamSetting> =
            serde_json::from_str(&fs::read_to_string(dir.join("streams.json")).unwrap()).unwrap();
        assert_eq!(saved.next_id, 3);
        assert_eq!(saved.records.len(), 1);
        assert_eq!(saved.records[0].stream_name, "lobby");

        // the deleted newest id stays retired across a reopen
        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
        assert_eq!(store.insert(setting("garage")).await.unwrap().id, 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_table_untouched() {
        let dir = workspace();
        let store = RecordStore::<StreamSetting>::open(&dir, "streams.json").unwrap();
        store.insert(setting("front door")).await.unwrap();

        // make the target path unwritable by turning it into a directory
        fs::remove_file(dir.join("streams.json")).unwrap();
        fs::create_dir(dir.join("streams.json")).unwrap();

        assert!(store.insert(setting("backyard")).await.is_err());
        assert!(store.remove(1).await.is_err());
        assert_eq!(store.list().await.len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }
}
