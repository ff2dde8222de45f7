//! A scripted stand-in for the protocol engine.
//!
//! The engine end holds the client half of a Unix socketpair, so the
//! connection's readiness waits are real: the server handle releases staged
//! results by writing one signal byte per release to the other half, and
//! `consume_input` drains the socket and makes the staged results visible to
//! `get_result`. Per-statement result streams are separated by null gaps and
//! closed by a sync marker, mirroring the production engine's result stream.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

use async_pq::connection::Connection;
use async_pq::{Error, Flush, Param, Polling, PqEngine, PqResult, Result};

/// Completion status of a scripted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeStatus {
    TuplesOk,
    CommandOk,
    Sync,
}

/// One scripted result message.
#[derive(Debug, Clone)]
pub struct FakeResult {
    pub status: FakeStatus,
    /// The command this result answers; lets tests assert that results and
    /// submissions stay paired.
    pub command: String,
    pub rows: Vec<Vec<String>>,
}

impl FakeResult {
    pub fn tuples(command: &str, rows: &[&[&str]]) -> Self {
        Self {
            status: FakeStatus::TuplesOk,
            command: command.to_string(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    pub fn command_ok(command: &str) -> Self {
        Self {
            status: FakeStatus::CommandOk,
            command: command.to_string(),
            rows: Vec::new(),
        }
    }

    fn sync() -> Self {
        Self {
            status: FakeStatus::Sync,
            command: String::new(),
            rows: Vec::new(),
        }
    }
}

impl PqResult for FakeResult {
    fn is_sync_point(&self) -> bool {
        self.status == FakeStatus::Sync
    }
}

/// A result message or the null gap separating per-statement streams.
enum Item {
    Result(FakeResult),
    Gap,
}

struct State {
    sent: Vec<String>,
    syncs: usize,
    pipeline_mode: bool,
    status_ok: bool,
    poll_script: VecDeque<Polling>,
    /// Released by the server, hidden from `get_result` until consumed.
    staged: VecDeque<Item>,
    /// Visible to `get_result`.
    ready: VecDeque<Item>,
    fail_next_consume: bool,
    flush_calls: usize,
    consume_calls: usize,
}

/// Scripted engine backing a [`Connection`] under test.
pub struct FakeEngine {
    sock: UnixStream,
    state: Rc<RefCell<State>>,
}

/// Test-side handle releasing results and inspecting the engine.
pub struct FakeServer {
    peer: UnixStream,
    state: Rc<RefCell<State>>,
}

impl FakeEngine {
    pub fn pair() -> (FakeEngine, FakeServer) {
        let (sock, peer) = UnixStream::pair().expect("socketpair");
        sock.set_nonblocking(true).expect("nonblocking");
        let state = Rc::new(RefCell::new(State {
            sent: Vec::new(),
            syncs: 0,
            pipeline_mode: false,
            status_ok: true,
            poll_script: VecDeque::new(),
            staged: VecDeque::new(),
            ready: VecDeque::new(),
            fail_next_consume: false,
            flush_calls: 0,
            consume_calls: 0,
        }));
        (
            FakeEngine {
                sock,
                state: state.clone(),
            },
            FakeServer { peer, state },
        )
    }
}

impl PqEngine for FakeEngine {
    type Result = FakeResult;

    fn status_ok(&self) -> bool {
        self.state.borrow().status_ok
    }

    fn socket(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    fn set_nonblocking(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll_connect(&mut self) -> Polling {
        self.state
            .borrow_mut()
            .poll_script
            .pop_front()
            .unwrap_or(Polling::Ok)
    }

    fn enter_pipeline_mode(&mut self) -> Result<()> {
        self.state.borrow_mut().pipeline_mode = true;
        Ok(())
    }

    fn send_query_params(&mut self, command: &str, _params: &[Param]) -> Result<()> {
        self.state.borrow_mut().sent.push(command.to_string());
        Ok(())
    }

    fn pipeline_sync(&mut self) -> Result<()> {
        self.state.borrow_mut().syncs += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<Flush> {
        self.state.borrow_mut().flush_calls += 1;
        Ok(Flush::Done)
    }

    fn consume_input(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.consume_calls += 1;
        if state.fail_next_consume {
            return Err(Error::PqConsumeInput);
        }

        let mut buf = [0u8; 64];
        loop {
            match (&self.sock).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(Error::Io(err)),
            }
        }

        let mut staged = std::mem::take(&mut state.staged);
        state.ready.append(&mut staged);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.state.borrow().ready.is_empty()
    }

    fn get_result(&mut self) -> Option<FakeResult> {
        match self.state.borrow_mut().ready.pop_front() {
            Some(Item::Result(result)) => Some(result),
            Some(Item::Gap) | None => None,
        }
    }

    fn error_message(&self) -> String {
        "scripted engine failure".to_string()
    }
}

impl FakeServer {
    /// Script the outcomes of successive connect poll steps; the default
    /// script answers `Ok` immediately.
    pub fn script_polling(&self, steps: &[Polling]) {
        self.state.borrow_mut().poll_script = steps.iter().copied().collect();
    }

    /// Make `status_ok` report a dead handle.
    pub fn mark_bad(&self) {
        self.state.borrow_mut().status_ok = false;
    }

    /// Stage the full result stream of one sync boundary and signal
    /// readability: one result and one gap per statement, closed by a sync
    /// marker.
    pub fn respond(&self, results: Vec<FakeResult>) {
        {
            let mut state = self.state.borrow_mut();
            for result in results {
                state.staged.push_back(Item::Result(result));
                state.staged.push_back(Item::Gap);
            }
            state.staged.push_back(Item::Result(FakeResult::sync()));
            state.staged.push_back(Item::Gap);
        }
        self.signal();
    }

    /// Stage results without closing the sync boundary.
    pub fn respond_partial(&self, results: Vec<FakeResult>) {
        {
            let mut state = self.state.borrow_mut();
            for result in results {
                state.staged.push_back(Item::Result(result));
                state.staged.push_back(Item::Gap);
            }
        }
        self.signal();
    }

    /// Make the engine's descriptor readable without staging anything.
    pub fn signal(&self) {
        (&self.peer).write_all(&[1]).expect("signal peer");
    }

    /// Fail the next `consume_input` call.
    pub fn fail_next_consume(&self) {
        self.state.borrow_mut().fail_next_consume = true;
        self.signal();
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.clone()
    }

    pub fn sync_count(&self) -> usize {
        self.state.borrow().syncs
    }

    pub fn pipeline_mode(&self) -> bool {
        self.state.borrow().pipeline_mode
    }

    pub fn flush_calls(&self) -> usize {
        self.state.borrow().flush_calls
    }

    pub fn consume_calls(&self) -> usize {
        self.state.borrow().consume_calls
    }
}

/// Connect over a fresh scripted engine.
pub async fn connect() -> (Connection<FakeEngine>, FakeServer) {
    let (engine, server) = FakeEngine::pair();
    let conn = Connection::connect_with(engine).await.expect("connect");
    (conn, server)
}

/// Poll `fut` to completion while driving the connection's pipeline engine.
///
/// Panics if the engine stops first; tests that expect the engine to fail
/// race `run` themselves.
pub async fn drive<T>(conn: &Connection<FakeEngine>, fut: impl Future<Output = T>) -> T {
    tokio::select! {
        biased;
        out = fut => out,
        res = conn.run() => match res {
            Err(err) => panic!("pipeline engine stopped: {err}"),
            Ok(()) => unreachable!("run resolved without error"),
        },
    }
}
