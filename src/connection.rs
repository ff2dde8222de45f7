//! Connection lifecycle: handshake, submissions, the duplex engine,
//! teardown.

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::engine::{PqEngine, Polling};
use crate::error::{Error, Result};
use crate::handler::{BatchSink, DetachGuard, ResultSink, SingleQuerySink, SinkQueue, SinkState};
use crate::pipeline::Duplex;
use crate::query::{PipelinedQuery, Query};
use crate::socket::Watcher;

/// An established pipelining session over one stream connection.
///
/// [`run`](Self::run) must be driven concurrently with any submission, e.g.
/// under `tokio::select!` or on a `LocalSet`. All futures produced by a
/// connection are `!Send`; one connection's tasks share one single-threaded
/// executor. Submissions must be serialized by the caller: only one task may
/// be inside [`query`](Self::query)/[`exec_pipeline`](Self::exec_pipeline)'s
/// submit phase at a time, though any number may be awaiting results.
pub struct Connection<E: PqEngine> {
    // The watcher's view of the descriptor must be released before the
    // engine's finalizer closes it.
    socket: Watcher,
    engine: RefCell<E>,
    write_cv: Notify,
    sinks: SinkQueue<E::Result>,
}

impl<E: PqEngine> std::fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl<E: PqEngine> Connection<E> {
    /// Drive the handshake of an already-started engine handle to an
    /// established pipelining session.
    pub async fn connect_with(mut engine: E) -> Result<Self> {
        if !engine.status_ok() {
            return Err(Error::PqStatus);
        }
        engine.set_nonblocking()?;

        let socket = Watcher::attach(engine.socket())?;
        loop {
            match engine.poll_connect() {
                Polling::Reading => socket.wait_readable().await?,
                Polling::Writing => socket.wait_writable().await?,
                Polling::Failed => return Err(Error::ConnectionFailed),
                Polling::Ok => break,
            }
        }

        engine.enter_pipeline_mode()?;
        debug!("connection established in pipeline mode");

        Ok(Self {
            socket,
            engine: RefCell::new(engine),
            write_cv: Notify::new(),
            sinks: SinkQueue::new(),
        })
    }

    /// Submit a single statement and await its result.
    ///
    /// The statement is bracketed by its own sync point, so it forms a
    /// one-element pipeline. Resolves with [`Error::ConnectionFailed`] if
    /// the session collapses while the result is pending.
    pub async fn query<'a>(&self, query: impl Into<Query<'a>>) -> Result<E::Result> {
        let query = query.into();
        {
            let mut engine = self.engine.borrow_mut();
            engine.send_query_params(query.command, query.params)?;
            engine.pipeline_sync()?;
        }
        trace!(command = query.command, "queued single statement");
        self.write_cv.notify_one();

        let sink = Rc::new(SingleQuerySink::new());
        self.sinks.push(sink.clone());
        sink.wait().await;

        match sink.state() {
            SinkState::Completed => Ok(sink
                .take_result()
                .expect("completed sink holds a result")),
            SinkState::Cancelled => Err(Error::ConnectionFailed),
            SinkState::Waiting => Err(Error::OperationAborted),
        }
    }

    /// Submit an ordered batch as one sync boundary and await all results.
    ///
    /// On success every element's `result` slot is filled in submission
    /// order. If the returned future is dropped before completion, the batch
    /// keeps its place in the pipeline and the remaining results are
    /// discarded as they arrive; the slots are never written and the
    /// connection stays usable for further submissions.
    pub async fn exec_pipeline(&self, batch: &mut [PipelinedQuery<E::Result>]) -> Result<()> {
        {
            let mut engine = self.engine.borrow_mut();
            for query in batch.iter() {
                engine.send_query_params(&query.command, &query.params)?;
            }
            engine.pipeline_sync()?;
        }
        trace!(statements = batch.len(), "queued pipelined batch");
        self.write_cv.notify_one();

        if batch.is_empty() {
            // Sync-only submission; the reader discards the lone marker.
            return Ok(());
        }

        let sink = Rc::new(BatchSink::new(batch.len()));
        self.sinks.push(sink.clone());

        let mut guard = DetachGuard::new(&sink);
        sink.wait().await;
        guard.disarm();

        match sink.state() {
            SinkState::Completed => {
                for (slot, result) in batch.iter_mut().zip(sink.take_results()) {
                    slot.result = Some(result);
                }
                Ok(())
            }
            SinkState::Cancelled => Err(Error::ConnectionFailed),
            SinkState::Waiting => Err(Error::OperationAborted),
        }
    }

    /// Drive the writer/reader pair until either fails.
    ///
    /// Resolves only on error or cancellation. On the way out every pending
    /// submission is cancelled, so awaiting submitters resolve with
    /// [`Error::ConnectionFailed`].
    pub async fn run(&self) -> Result<()> {
        let duplex = Duplex {
            engine: &self.engine,
            socket: &self.socket,
            write_cv: &self.write_cv,
            sinks: &self.sinks,
        };
        let err = duplex.run().await;
        debug!(error = %err, "pipeline engine stopped");
        self.sinks.cancel_all();
        Err(err)
    }

    /// The engine's last error text.
    pub fn error_message(&self) -> String {
        self.engine.borrow().error_message()
    }
}

impl<E: PqEngine> Drop for Connection<E> {
    fn drop(&mut self) {
        self.sinks.cancel_all();
    }
}

#[cfg(feature = "libpq")]
impl Connection<crate::libpq::LibpqEngine> {
    /// Start a libpq handle for `conninfo` and drive it to an established
    /// pipelining session.
    ///
    /// `conninfo` is passed to libpq untouched; both URI and keyword/value
    /// forms are accepted.
    pub async fn connect(conninfo: &str) -> Result<Self> {
        Self::connect_with(crate::libpq::LibpqEngine::start(conninfo)?).await
    }
}
