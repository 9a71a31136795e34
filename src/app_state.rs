use crate::store::{Overlay, RecordStore, StreamSetting};
use crate::stream::StreamSupervisor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HLS_DIR: &str = "hls";
const STREAMS_FILE: &str = "stream-settings.json";
const OVERLAYS_FILE: &str = "overlays.json";

async fn init_workspace(workspace: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace.join(HLS_DIR)).await?;
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<StreamSupervisor>,
    pub stream_settings: RecordStore<StreamSetting>,
    pub overlays: RecordStore<Overlay>,

    pub hls_dir: PathBuf,
}

impl AppState {
    pub async fn new(
        workspace: &Path,
        supervisor: Arc<StreamSupervisor>,
        liveness_interval: Option<Duration>,
    ) -> anyhow::Result<Self> {
        init_workspace(workspace).await?;

        let this = Self {
            supervisor,
            stream_settings: RecordStore::open(workspace, STREAMS_FILE)?,
            overlays: RecordStore::open(workspace, OVERLAYS_FILE)?,

            hls_dir: workspace.join(HLS_DIR),
        };

        if let Some(interval) = liveness_interval {
            this.watch_streams(interval);
        }
        Ok(this)
    }

    pub fn hls_dir(&self) -> &Path {
        self.hls_dir.as_path()
    }

    /// Periodically drop streams whose transcoder died without being stopped.
    fn watch_streams(&self, interval: Duration) {
        info!(?interval, "Stream liveness sweep started");
        let supervisor = self.supervisor.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pruned = supervisor.prune_exited().await;
                if pruned.is_empty() {
                    debug!("All streams alive");
                } else {
                    warn!(?pruned, "Removed streams with exited transcoders");
                }
            }
        });
    }
}
