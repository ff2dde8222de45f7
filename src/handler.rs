//! Per-request result consumers.
//!
//! Every submission enqueues one sink on the connection's FIFO. The reader
//! loop feeds results to the front sink and pops it once it reports
//! completion; the submitting task sleeps on the sink's condition until the
//! state leaves `Waiting`.
//!
//! Sinks are shared between the FIFO and the awaiter and outlive a cancelled
//! submitter: a batch sink whose submitter dropped mid-wait keeps its FIFO
//! position and drains the remaining results of its sync boundary, so the
//! reader's handler/sync alignment is preserved.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tokio::sync::Notify;

/// Lifecycle of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkState {
    /// Enqueued; results still outstanding.
    Waiting,
    /// All expected results consumed; the submitter may collect.
    Completed,
    /// The connection tore down before the results arrived.
    Cancelled,
}

/// A consumer of the results of one submission, dispatched by the reader.
pub(crate) trait ResultSink<R> {
    /// Feed one non-sync result to the sink.
    fn deliver(&self, result: R);

    fn state(&self) -> SinkState;

    /// Teardown: wake the submitter with a failure outcome.
    fn cancel(&self);
}

/// One-shot completion condition shared by the sink variants.
struct Condition {
    state: Cell<SinkState>,
    cv: Notify,
}

impl Condition {
    fn new() -> Self {
        Self {
            state: Cell::new(SinkState::Waiting),
            cv: Notify::new(),
        }
    }

    fn state(&self) -> SinkState {
        self.state.get()
    }

    fn complete(&self) {
        self.state.set(SinkState::Completed);
        self.cv.notify_one();
    }

    fn cancel(&self) {
        self.state.set(SinkState::Cancelled);
        self.cv.notify_one();
    }

    /// Sleep until the state leaves `Waiting`. A wake signalled before the
    /// first poll is not lost.
    async fn wait(&self) {
        while self.state.get() == SinkState::Waiting {
            self.cv.notified().await;
        }
    }
}

/// Sink for a single-statement submission: stores exactly one result and
/// completes on the first non-sync message.
pub(crate) struct SingleQuerySink<R> {
    cond: Condition,
    slot: RefCell<Option<R>>,
}

impl<R> SingleQuerySink<R> {
    pub(crate) fn new() -> Self {
        Self {
            cond: Condition::new(),
            slot: RefCell::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        self.cond.wait().await;
    }

    pub(crate) fn take_result(&self) -> Option<R> {
        self.slot.borrow_mut().take()
    }
}

impl<R> ResultSink<R> for SingleQuerySink<R> {
    fn deliver(&self, result: R) {
        *self.slot.borrow_mut() = Some(result);
        self.cond.complete();
    }

    fn state(&self) -> SinkState {
        self.cond.state()
    }

    fn cancel(&self) {
        self.cond.cancel();
    }
}

/// Sink for a pipelined batch: collects `expected` results in order, or
/// counts them down unseen after the submitter detached.
pub(crate) struct BatchSink<R> {
    cond: Condition,
    expected: usize,
    filled: RefCell<Vec<R>>,
    drain: Cell<usize>,
}

impl<R> BatchSink<R> {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            cond: Condition::new(),
            expected,
            filled: RefCell::new(Vec::with_capacity(expected)),
            drain: Cell::new(0),
        }
    }

    pub(crate) async fn wait(&self) {
        self.cond.wait().await;
    }

    pub(crate) fn state(&self) -> SinkState {
        self.cond.state()
    }

    /// Switch to drain mode: drop what was collected, count the remaining
    /// results of this sync boundary down as they arrive, and complete when
    /// the count reaches zero. The caller's slots are never written after
    /// this point.
    pub(crate) fn detach(&self) {
        let mut filled = self.filled.borrow_mut();
        self.drain.set(self.expected - filled.len());
        filled.clear();
    }

    /// Move the collected results out, in delivery order.
    pub(crate) fn take_results(&self) -> Vec<R> {
        std::mem::take(&mut *self.filled.borrow_mut())
    }
}

impl<R> ResultSink<R> for BatchSink<R> {
    fn deliver(&self, result: R) {
        let drain = self.drain.get();
        if drain > 0 {
            drop(result);
            self.drain.set(drain - 1);
            if drain == 1 {
                self.cond.complete();
            }
            return;
        }

        let mut filled = self.filled.borrow_mut();
        filled.push(result);
        if filled.len() == self.expected {
            drop(filled);
            self.cond.complete();
        }
    }

    fn state(&self) -> SinkState {
        self.cond.state()
    }

    fn cancel(&self) {
        self.cond.cancel();
    }
}

/// Detaches a batch sink when the submitting future is dropped mid-wait.
pub(crate) struct DetachGuard<'a, R> {
    sink: &'a BatchSink<R>,
    armed: bool,
}

impl<'a, R> DetachGuard<'a, R> {
    pub(crate) fn new(sink: &'a BatchSink<R>) -> Self {
        Self { sink, armed: true }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<R> Drop for DetachGuard<'_, R> {
    fn drop(&mut self) {
        if self.armed && self.sink.state() == SinkState::Waiting {
            self.sink.detach();
        }
    }
}

/// FIFO of pending sinks, one per outstanding submission.
///
/// Mutated only from the connection's executor: submitters push, the reader
/// pops, teardown cancels all.
pub(crate) struct SinkQueue<R: 'static> {
    inner: RefCell<VecDeque<Rc<dyn ResultSink<R>>>>,
}

impl<R: 'static> SinkQueue<R> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, sink: Rc<dyn ResultSink<R>>) {
        self.inner.borrow_mut().push_back(sink);
    }

    pub(crate) fn front(&self) -> Option<Rc<dyn ResultSink<R>>> {
        self.inner.borrow().front().cloned()
    }

    pub(crate) fn pop(&self) {
        self.inner.borrow_mut().pop_front();
    }

    /// Teardown: cancel every queued sink, waking its submitter.
    pub(crate) fn cancel_all(&self) {
        loop {
            let Some(sink) = self.inner.borrow_mut().pop_front() else {
                break;
            };
            sink.cancel();
        }
    }
}
