//! Live stream lifecycle: external tool invocation, the registry of running
//! transcoders and the supervisor tying them together.

pub mod error;
pub mod invoker;
pub mod output;
pub mod registry;
pub mod supervisor;

pub use error::StreamError;
pub use invoker::{FfmpegTool, MediaTool, Termination, TranscodeProcess};
pub use output::{OutputRecordReader, OutputSummary, log_transcoder_output};
pub use registry::{ActiveStream, StreamInfo, StreamRegistry};
pub use supervisor::{PLAYLIST_EXTENSION, StreamSupervisor, is_rtsp_url, playlist_path};
