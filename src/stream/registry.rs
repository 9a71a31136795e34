use crate::stream::TranscodeProcess;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Bookkeeping for one active stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub source_url: String,
    /// Playlist written by the transcoder.
    pub output_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// A registered stream: its metadata together with the process serving it.
#[derive(Debug)]
pub struct ActiveStream {
    pub info: StreamInfo,
    pub process: TranscodeProcess,
}

/// Active streams keyed by caller-chosen identifier.
///
/// Metadata and process handle share one entry, so they are always added
/// and removed together.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: HashMap<String, ActiveStream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `id`, handing back whatever it displaced.
    pub fn insert(&mut self, id: String, entry: ActiveStream) -> Option<ActiveStream> {
        self.streams.insert(id, entry)
    }

    pub fn get(&self, id: &str) -> Option<StreamInfo> {
        self.streams.get(id).map(|entry| entry.info.clone())
    }

    #[cfg(test)]
    pub fn pid(&self, id: &str) -> Option<u32> {
        self.streams.get(id).and_then(|entry| entry.process.pid())
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.streams.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ActiveStream> {
        self.streams.remove(id)
    }

    /// Snapshot of every active stream, ordered by identifier.
    pub fn list(&self) -> Vec<(String, StreamInfo)> {
        let mut streams = self
            .streams
            .iter()
            .map(|(id, entry)| (id.clone(), entry.info.clone()))
            .collect::<Vec<_>>();
        streams.sort_by(|a, b| a.0.cmp(&b.0));
        streams
    }

    pub fn drain(&mut self) -> Vec<(String, ActiveStream)> {
        self.streams.drain().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Identifiers whose process has already exited.
    pub fn exited_ids(&mut self) -> Vec<String> {
        self.streams
            .iter_mut()
            .filter_map(|(id, entry)| match entry.process.has_exited() {
                Ok(true) => Some(id.clone()),
                Ok(false) => None,
                Err(error) => {
                    warn!(id, ?error, "Failed to poll transcoder");
                    None
                }
            })
            .collect()
    }
}
