//! The contract between the pipeline core and the underlying protocol
//! engine.
//!
//! The core does not speak the PostgreSQL wire protocol itself. It drives a
//! non-blocking engine (libpq in production, a scripted stand-in in tests)
//! through the narrow surface below: queue statements, flush buffered bytes,
//! absorb readable input, and pull decoded results one message at a time.
//! Readiness is awaited by the caller on the descriptor the engine owns.

use std::os::unix::io::RawFd;

use crate::error::Result;
use crate::query::Param;

/// One decoded result message produced by the engine.
///
/// Results are moved exactly once, from the reader loop into the consumer
/// awaiting them, and released when that consumer drops them.
pub trait PqResult {
    /// Whether this message is a pipeline sync boundary marker rather than a
    /// statement result.
    fn is_sync_point(&self) -> bool;
}

/// Outcome of one connect poll step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polling {
    /// Wait until the socket is readable, then poll again.
    Reading,
    /// Wait until the socket is writable, then poll again.
    Writing,
    /// The connection is established.
    Ok,
    /// The connection attempt failed.
    Failed,
}

/// Outcome of one flush step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every buffered byte reached the socket.
    Done,
    /// The socket would block; wait for writability and flush again.
    Again,
}

/// A non-blocking protocol engine handle.
///
/// All operations are synchronous and must never block. Starting a handle is
/// an inherent constructor of each implementation (e.g.
/// `LibpqEngine::start`); the trait covers the lifecycle from a started
/// handle onwards. Dropping the handle closes the underlying descriptor.
///
/// The handle is not reentrant: all calls must come from the connection's
/// executor.
pub trait PqEngine: Sized {
    /// The engine's owned result message type.
    type Result: PqResult + 'static;

    /// Whether the freshly started handle is usable at all.
    fn status_ok(&self) -> bool;

    /// The descriptor owned by the engine. Callers may watch it for
    /// readiness but must never close it.
    fn socket(&self) -> RawFd;

    /// Switch the handle to non-blocking operation.
    fn set_nonblocking(&mut self) -> Result<()>;

    /// Advance the connection handshake by one step.
    fn poll_connect(&mut self) -> Polling;

    /// Switch the established connection into pipeline mode.
    fn enter_pipeline_mode(&mut self) -> Result<()>;

    /// Queue one parameterized statement. Bytes are buffered inside the
    /// engine until [`flush`](Self::flush) pushes them to the socket.
    fn send_query_params(&mut self, command: &str, params: &[Param]) -> Result<()>;

    /// Queue a pipeline sync point closing the current batch.
    fn pipeline_sync(&mut self) -> Result<()>;

    /// Push buffered bytes towards the socket.
    fn flush(&mut self) -> Result<Flush>;

    /// Absorb whatever the socket has to offer without blocking.
    fn consume_input(&mut self) -> Result<()>;

    /// Whether [`get_result`](Self::get_result) would need more input.
    fn is_busy(&self) -> bool;

    /// The next decoded result, or `None` at a result-stream boundary.
    fn get_result(&mut self) -> Option<Self::Result>;

    /// The engine's last error text.
    fn error_message(&self) -> String;
}
