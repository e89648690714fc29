use thiserror::Error;

/// Errors raised by the playback and analysis pipeline.
///
/// Streaming failures (`Decode`, `Output`) never cross the worker thread
/// boundary as panics or returns; they are recorded in the session's terminal
/// state and handed back through [`crate::Session::wait`] or
/// [`crate::Session::state`]. The error chain of the collaborator is rendered
/// into `message` so the error stays cheap to clone for every reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid stream parameters or analysis settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The estimator was handed zero samples.
    #[error("cannot estimate a spectrum from an empty sample block")]
    EmptyInput,

    /// `start()` was called on a session that already left `Idle`.
    #[error("session already started")]
    AlreadyStarted,

    /// The decoder failed while producing block `block` (zero based).
    #[error("decode failed on block {block}: {message}")]
    Decode { block: u64, message: String },

    /// The output sink rejected block `block` (zero based).
    #[error("output failed on block {block}: {message}")]
    Output { block: u64, message: String },

    /// The output sink could not be opened for the stream's format.
    #[error("failed to open output: {0}")]
    OutputOpen(String),

    /// The streaming thread panicked before reaching a terminal state.
    #[error("playback worker panicked")]
    WorkerPanicked,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid JSON configuration: {0}")]
    Json(String),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// True for failures that ended a running stream.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. } | Error::Output { .. } | Error::WorkerPanicked
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
