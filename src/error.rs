//! Error types for async-pq.

use thiserror::Error;

/// Result type for async-pq operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for async-pq.
///
/// Engine-reported failures are named after the facade operation that was
/// rejected; the engine's own diagnostic text stays available through
/// [`Connection::error_message`](crate::Connection::error_message) while the
/// handle is alive.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine handle reported a bad status right after start.
    #[error("connection handle is in a bad state")]
    PqStatus,

    /// Switching the engine to non-blocking operation failed.
    #[error("could not set the connection non-blocking")]
    PqSetNonblocking,

    /// The connect poll loop ended in failure, or the session collapsed
    /// underneath a waiting submitter.
    #[error("connection failed")]
    ConnectionFailed,

    /// The established connection refused to enter pipeline mode.
    #[error("could not enter pipeline mode")]
    PqEnterPipelineMode,

    /// The engine rejected a queued statement.
    #[error("could not send query")]
    PqSendQueryParams,

    /// The engine rejected a pipeline sync point.
    #[error("could not send pipeline sync")]
    PqPipelineSync,

    /// The engine failed to absorb readable input.
    #[error("could not consume input")]
    PqConsumeInput,

    /// The submitting task was cancelled while its results were pending.
    #[error("operation aborted")]
    OperationAborted,

    /// I/O error from a readiness wait or a flush.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the error is a cancellation outcome rather than a
    /// connection or protocol failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::OperationAborted)
    }
}
