use crate::config::Config;
use crate::stream::StreamError;
use crate::stream::output::log_transcoder_output;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// ffprobe's own socket timeout, in microseconds.
const PROBE_SOCKET_TIMEOUT_US: &str = "10000000";

/// Runs the external media tools on behalf of the supervisor.
pub trait MediaTool: Send + Sync + 'static {
    /// Returns true only if the source can be inspected successfully within
    /// the tool's deadline. Every failure collapses to `false`.
    fn probe(&self, source_url: &str) -> impl Future<Output = bool> + Send;

    /// Launches a long-running transcode from `source_url` into the playlist
    /// at `output_path`.
    fn spawn(&self, source_url: &str, output_path: &Path) -> Result<TranscodeProcess, StreamError>;
}

/// How a transcoder went away when asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// It had already exited before the request.
    AlreadyExited(ExitStatus),
    /// It quit on its own within the grace period.
    Graceful(ExitStatus),
    /// The grace period elapsed and it was killed.
    Killed,
}

/// A running transcoder child process.
#[derive(Debug)]
pub struct TranscodeProcess {
    child: Child,
}

impl TranscodeProcess {
    /// Wraps a spawned child. Its stdin should be piped so it can be asked to quit.
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Ask the process to quit by sending `q` on stdin (ffmpeg's interactive
    /// quit command), then wait up to `grace` before killing it.
    pub async fn terminate(mut self, grace: Duration) -> io::Result<Termination> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(Termination::AlreadyExited(status));
        }

        if let Some(mut stdin) = self.child.stdin.take() {
            // broken pipe here only means the process is already on its way out
            if let Err(error) = stdin.write_all(b"q\n").await {
                debug!(?error, pid = ?self.child.id(), "Failed to send quit request");
            }
            drop(stdin);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(Termination::Graceful(status?)),
            Err(_) => {
                self.child.kill().await?;
                Ok(Termination::Killed)
            }
        }
    }
}

/// The production [`MediaTool`]: `ffprobe` for validation, `ffmpeg` for
/// RTSP to HLS transcoding.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    probe_timeout: Duration,
    hls_time: u32,
    hls_list_size: u32,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FfmpegTool {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            probe_timeout: config.probe_timeout(),
            hls_time: config.hls_time,
            hls_list_size: config.hls_list_size,
        }
    }

    fn probe_args(source_url: &str) -> [&str; 8] {
        [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-timeout",
            PROBE_SOCKET_TIMEOUT_US,
            source_url,
        ]
    }

    fn transcode_args(&self, source_url: &str, output_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-i",
            source_url,
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-f",
            "hls",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.extend(
            [
                "-hls_time".to_string(),
                self.hls_time.to_string(),
                "-hls_list_size".to_string(),
                self.hls_list_size.to_string(),
                "-hls_flags".to_string(),
                "delete_segments".to_string(),
                "-y".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(output_path.as_os_str().to_owned());
        args
    }
}

impl MediaTool for FfmpegTool {
    async fn probe(&self, source_url: &str) -> bool {
        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args(Self::probe_args(source_url));
        run_with_deadline(cmd, self.probe_timeout).await
    }

    fn spawn(&self, source_url: &str, output_path: &Path) -> Result<TranscodeProcess, StreamError> {
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(self.transcode_args(source_url, output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StreamError::Spawn {
                program: self.ffmpeg_bin.clone(),
                source,
            })?;

        // ffmpeg reports progress on stderr continuously; keep the pipe drained
        if let Some(stderr) = child.stderr.take() {
            let playlist = output_path.display().to_string();
            tokio::spawn(async move {
                log_transcoder_output(stderr, &playlist).await;
            });
        }

        Ok(TranscodeProcess::new(child))
    }
}

/// Run `cmd` to completion and report whether it exited with status zero
/// before `timeout`. The child is killed if the deadline elapses.
pub(crate) async fn run_with_deadline(mut cmd: Command, timeout: Duration) -> bool {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => {
            if !output.status.success() {
                debug!(status = %output.status, "Probe exited unsuccessfully");
            }
            output.status.success()
        }
        Ok(Err(error)) => {
            warn!(?error, "Failed to run probe");
            false
        }
        Err(_) => {
            debug!(?timeout, "Probe timed out");
            false
        }
    }
}
