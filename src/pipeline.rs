//! The full-duplex loop pair driving one pipelined session.
//!
//! A writer and a reader share the engine handle, the socket watcher and the
//! sink FIFO. The writer sleeps until a submitter signals buffered bytes,
//! then flushes until the engine reports an empty send queue, waiting for
//! writability instead of spinning. The reader dispatches every result the
//! engine can produce without network I/O and only then waits for the socket
//! to become readable again; this keeps local results flowing under bursty
//! arrivals. The first loop to fail ends the session.

use std::cell::RefCell;

use tokio::sync::Notify;
use tracing::trace;

use crate::engine::{Flush, PqEngine, PqResult};
use crate::error::Error;
use crate::handler::{SinkQueue, SinkState};
use crate::socket::Watcher;

pub(crate) struct Duplex<'a, E: PqEngine> {
    pub(crate) engine: &'a RefCell<E>,
    pub(crate) socket: &'a Watcher,
    pub(crate) write_cv: &'a Notify,
    pub(crate) sinks: &'a SinkQueue<E::Result>,
}

impl<E: PqEngine> Duplex<'_, E> {
    /// Run both loops until either fails; the survivor is cancelled.
    pub(crate) async fn run(&self) -> Error {
        tokio::select! {
            err = self.write_loop() => err,
            err = self.read_loop() => err,
        }
    }

    async fn write_loop(&self) -> Error {
        loop {
            self.write_cv.notified().await;
            trace!("writer woken, flushing");
            loop {
                let flushed = self.engine.borrow_mut().flush();
                match flushed {
                    Ok(Flush::Done) => break,
                    Ok(Flush::Again) => {
                        if let Err(err) = self.socket.wait_writable().await {
                            return err;
                        }
                    }
                    Err(err) => return err,
                }
            }
        }
    }

    async fn read_loop(&self) -> Error {
        loop {
            self.dispatch_available();
            if let Err(err) = self.socket.wait_readable().await {
                return err;
            }
            if let Err(err) = self.engine.borrow_mut().consume_input() {
                return err;
            }
        }
    }

    /// Dispatch everything the engine can produce without network I/O.
    ///
    /// A single null from the engine does not prove the current sync
    /// boundary is drained: the engine may turn busy on an intra-message
    /// boundary. Only a second null while not busy is conclusive.
    fn dispatch_available(&self) {
        loop {
            let mut engine = self.engine.borrow_mut();
            if engine.is_busy() {
                return;
            }

            let result = match engine.get_result() {
                Some(result) => result,
                None => {
                    if engine.is_busy() {
                        return;
                    }
                    match engine.get_result() {
                        Some(result) => result,
                        None => return,
                    }
                }
            };
            drop(engine);

            if result.is_sync_point() {
                trace!("discarding sync boundary marker");
                continue;
            }

            // Engines route notices through their notice hook, so a result
            // here always belongs to a queued submission.
            let Some(sink) = self.sinks.front() else {
                debug_assert!(false, "result arrived with no pending submission");
                continue;
            };
            sink.deliver(result);
            if sink.state() == SinkState::Completed {
                trace!("front sink completed");
                self.sinks.pop();
            }
        }
    }
}
