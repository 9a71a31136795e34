use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the stream lifecycle operations.
///
/// The boolean supervisor API logs these and reports `false`; the `try_*`
/// variants hand them to callers that need a message.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    #[error("RTSP source unreachable: {0}")]
    Unreachable(String),

    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to stop stream {id}: {source}")]
    Stop {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("stream {0} is not active")]
    NotFound(String),
}
