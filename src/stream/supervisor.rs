use crate::stream::{
    ActiveStream, FfmpegTool, MediaTool, StreamError, StreamInfo, StreamRegistry, Termination,
    TranscodeProcess,
};
use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

pub const PLAYLIST_EXTENSION: &str = "m3u8";

static RTSP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rtsp://\S+$").expect("RTSP URL pattern must compile"));

/// `rtsp://` followed by at least one non-whitespace character, nothing else.
pub fn is_rtsp_url(url: &str) -> bool {
    RTSP_URL.is_match(url)
}

/// Location of the playlist a stream named `id` writes into `output_dir`.
pub fn playlist_path(output_dir: &Path, id: &str) -> PathBuf {
    output_dir.join(format!("{id}.{PLAYLIST_EXTENSION}"))
}

/// Owns the live transcoders and the registry describing them.
///
/// Registry changes happen under one lock, so an entry is always added or
/// removed as a whole. `stop` waits for its process outside the lock;
/// `start` and `cleanup_all` keep it until their processes are gone.
#[derive(Debug)]
pub struct StreamSupervisor<T = FfmpegTool> {
    tool: T,
    registry: TokioMutex<StreamRegistry>,
    stop_grace: Duration,
}

impl<T: MediaTool> StreamSupervisor<T> {
    pub fn new(tool: T, stop_grace: Duration) -> Self {
        Self {
            tool,
            registry: TokioMutex::new(StreamRegistry::new()),
            stop_grace,
        }
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub async fn try_validate(&self, source_url: &str) -> Result<(), StreamError> {
        if !is_rtsp_url(source_url) {
            return Err(StreamError::InvalidUrl(source_url.to_string()));
        }

        if self.tool.probe(source_url).await {
            Ok(())
        } else {
            Err(StreamError::Unreachable(source_url.to_string()))
        }
    }

    /// Checks that `source_url` is an RTSP URL and that the probe can read it.
    pub async fn validate(&self, source_url: &str) -> bool {
        match self.try_validate(source_url).await {
            Ok(()) => true,
            Err(error) => {
                debug!(%error, "Stream validation failed");
                false
            }
        }
    }

    /// Starts transcoding `source_url` into `output_dir/<id>.m3u8`.
    ///
    /// A stream already registered under `id` is stopped first and replaced.
    /// The lock is held across that replacement so two transcoders never
    /// write the same playlist; a restart can therefore block other registry
    /// calls for up to the stop grace period.
    pub async fn try_start(
        &self,
        id: &str,
        source_url: &str,
        output_dir: &Path,
    ) -> Result<StreamInfo, StreamError> {
        let mut registry = self.registry.lock().await;

        if let Some(previous) = registry.remove(id) {
            warn!(
                id,
                previous_source = %previous.info.source_url,
                "Stream already active, replacing"
            );
            self.terminate(id, previous.process).await?;
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| StreamError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let output_path = playlist_path(output_dir, id);
        let process = self.tool.spawn(source_url, &output_path)?;
        let info = StreamInfo {
            source_url: source_url.to_string(),
            output_path,
            started_at: Utc::now(),
        };

        info!(
            id,
            source_url,
            pid = ?process.pid(),
            output = %info.output_path.display(),
            "Stream started"
        );
        registry.insert(
            id.to_string(),
            ActiveStream {
                info: info.clone(),
                process,
            },
        );

        Ok(info)
    }

    pub async fn start(&self, id: &str, source_url: &str, output_dir: &Path) -> bool {
        match self.try_start(id, source_url, output_dir).await {
            Ok(_) => true,
            Err(error) => {
                error!(id, source_url, %error, "Failed to start stream");
                false
            }
        }
    }

    /// Stops the stream registered under `id`. Unknown identifiers succeed.
    ///
    /// The entry is detached under the lock; waiting for the process to quit
    /// happens after the lock is released, so readers are not held up by the
    /// grace period.
    pub async fn try_stop(&self, id: &str) -> Result<(), StreamError> {
        let entry = self.registry.lock().await.remove(id);
        let Some(entry) = entry else {
            debug!(id, "Stop requested for inactive stream");
            return Ok(());
        };

        self.terminate(id, entry.process).await
    }

    pub async fn stop(&self, id: &str) -> bool {
        match self.try_stop(id).await {
            Ok(()) => true,
            Err(error) => {
                error!(id, %error, "Failed to stop stream");
                false
            }
        }
    }

    pub async fn status(&self, id: &str) -> Option<StreamInfo> {
        self.registry.lock().await.get(id)
    }

    pub async fn try_status(&self, id: &str) -> Result<StreamInfo, StreamError> {
        self.status(id)
            .await
            .ok_or_else(|| StreamError::NotFound(id.to_string()))
    }

    pub async fn list_active(&self) -> Vec<(String, StreamInfo)> {
        self.registry.lock().await.list()
    }

    /// Stops every registered stream. The registry is empty afterwards.
    pub async fn cleanup_all(&self) {
        let mut registry = self.registry.lock().await;
        let drained = registry.drain();
        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "Stopping all streams");
        let results = join_all(drained.into_iter().map(|(id, entry)| async move {
            let result = self.terminate(&id, entry.process).await;
            (id, result)
        }))
        .await;

        for (id, result) in results {
            if let Err(error) = result {
                error!(id, %error, "Failed to stop stream during cleanup");
            }
        }
    }

    /// Drops the entries whose transcoder exited on its own and returns
    /// their identifiers.
    pub async fn prune_exited(&self) -> Vec<String> {
        let mut registry = self.registry.lock().await;
        let exited = registry.exited_ids();
        for id in &exited {
            if let Some(entry) = registry.remove(id) {
                warn!(
                    id,
                    source_url = %entry.info.source_url,
                    "Transcoder exited unexpectedly, stream removed"
                );
            }
        }
        exited
    }

    async fn terminate(&self, id: &str, process: TranscodeProcess) -> Result<(), StreamError> {
        let pid = process.pid();
        match process.terminate(self.stop_grace).await {
            Ok(Termination::AlreadyExited(status)) => {
                info!(id, ?pid, %status, "Transcoder had already exited")
            }
            Ok(Termination::Graceful(status)) => info!(id, ?pid, %status, "Stream stopped"),
            Ok(Termination::Killed) => warn!(
                id,
                ?pid,
                grace = ?self.stop_grace,
                "Transcoder ignored quit request, killed"
            ),
            Err(source) => {
                return Err(StreamError::Stop {
                    id: id.to_string(),
                    source,
                });
            }
        }

        Ok(())
    }
}
