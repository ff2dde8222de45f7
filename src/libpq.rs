//! Production engine backed by the system libpq.
//!
//! The bindings are declared by hand against the stable libpq 14+ surface
//! this crate drives; the system library is linked as `pq`. libpq owns the
//! connection's socket: the handle exposes the descriptor for readiness
//! watching and closes it in `PQfinish` when dropped.

use std::ffi::{CStr, CString};
use std::os::unix::io::RawFd;
use std::ptr;

use libc::{c_char, c_int};

use crate::engine::{Flush, Polling, PqEngine, PqResult};
use crate::error::{Error, Result};
use crate::query::Param;

/// FFI surface of libpq used by the engine.
pub mod pq {
    use libc::{c_char, c_int, c_uint, c_void};

    pub enum PGconn {}
    pub enum PGresult {}

    pub type ConnStatusType = c_uint;
    pub const CONNECTION_BAD: ConnStatusType = 1;

    pub type PostgresPollingStatusType = c_uint;
    pub const PGRES_POLLING_FAILED: PostgresPollingStatusType = 0;
    pub const PGRES_POLLING_READING: PostgresPollingStatusType = 1;
    pub const PGRES_POLLING_WRITING: PostgresPollingStatusType = 2;
    pub const PGRES_POLLING_OK: PostgresPollingStatusType = 3;

    pub type ExecStatusType = c_uint;
    pub const PGRES_EMPTY_QUERY: ExecStatusType = 0;
    pub const PGRES_COMMAND_OK: ExecStatusType = 1;
    pub const PGRES_TUPLES_OK: ExecStatusType = 2;
    pub const PGRES_COPY_OUT: ExecStatusType = 3;
    pub const PGRES_COPY_IN: ExecStatusType = 4;
    pub const PGRES_BAD_RESPONSE: ExecStatusType = 5;
    pub const PGRES_NONFATAL_ERROR: ExecStatusType = 6;
    pub const PGRES_FATAL_ERROR: ExecStatusType = 7;
    pub const PGRES_COPY_BOTH: ExecStatusType = 8;
    pub const PGRES_SINGLE_TUPLE: ExecStatusType = 9;
    pub const PGRES_PIPELINE_SYNC: ExecStatusType = 10;
    pub const PGRES_PIPELINE_ABORTED: ExecStatusType = 11;

    pub type Oid = c_uint;

    pub type PQnoticeProcessor = unsafe extern "C" fn(arg: *mut c_void, message: *const c_char);

    #[link(name = "pq")]
    unsafe extern "C" {
        pub fn PQconnectStart(conninfo: *const c_char) -> *mut PGconn;
        pub fn PQstatus(conn: *const PGconn) -> ConnStatusType;
        pub fn PQsocket(conn: *const PGconn) -> c_int;
        pub fn PQsetnonblocking(conn: *mut PGconn, arg: c_int) -> c_int;
        pub fn PQconnectPoll(conn: *mut PGconn) -> PostgresPollingStatusType;
        pub fn PQsetNoticeProcessor(
            conn: *mut PGconn,
            proc_: PQnoticeProcessor,
            arg: *mut c_void,
        ) -> PQnoticeProcessor;
        pub fn PQenterPipelineMode(conn: *mut PGconn) -> c_int;
        pub fn PQsendQueryParams(
            conn: *mut PGconn,
            command: *const c_char,
            n_params: c_int,
            param_types: *const Oid,
            param_values: *const *const c_char,
            param_lengths: *const c_int,
            param_formats: *const c_int,
            result_format: c_int,
        ) -> c_int;
        pub fn PQpipelineSync(conn: *mut PGconn) -> c_int;
        pub fn PQflush(conn: *mut PGconn) -> c_int;
        pub fn PQconsumeInput(conn: *mut PGconn) -> c_int;
        pub fn PQisBusy(conn: *mut PGconn) -> c_int;
        pub fn PQgetResult(conn: *mut PGconn) -> *mut PGresult;
        pub fn PQresultStatus(res: *const PGresult) -> ExecStatusType;
        pub fn PQntuples(res: *const PGresult) -> c_int;
        pub fn PQnfields(res: *const PGresult) -> c_int;
        pub fn PQgetvalue(res: *const PGresult, tup_num: c_int, field_num: c_int) -> *mut c_char;
        pub fn PQgetlength(res: *const PGresult, tup_num: c_int, field_num: c_int) -> c_int;
        pub fn PQgetisnull(res: *const PGresult, tup_num: c_int, field_num: c_int) -> c_int;
        pub fn PQclear(res: *mut PGresult);
        pub fn PQerrorMessage(conn: *const PGconn) -> *const c_char;
        pub fn PQfinish(conn: *mut PGconn);
    }
}

extern "C" fn quiet_notice_processor(_arg: *mut libc::c_void, _message: *const c_char) {}

/// Completion status of one result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    CopyOut,
    CopyIn,
    BadResponse,
    NonfatalError,
    FatalError,
    CopyBoth,
    SingleTuple,
    PipelineSync,
    PipelineAborted,
}

impl ResultStatus {
    fn from_raw(raw: pq::ExecStatusType) -> Self {
        match raw {
            pq::PGRES_EMPTY_QUERY => Self::EmptyQuery,
            pq::PGRES_COMMAND_OK => Self::CommandOk,
            pq::PGRES_TUPLES_OK => Self::TuplesOk,
            pq::PGRES_COPY_OUT => Self::CopyOut,
            pq::PGRES_COPY_IN => Self::CopyIn,
            pq::PGRES_NONFATAL_ERROR => Self::NonfatalError,
            pq::PGRES_FATAL_ERROR => Self::FatalError,
            pq::PGRES_COPY_BOTH => Self::CopyBoth,
            pq::PGRES_SINGLE_TUPLE => Self::SingleTuple,
            pq::PGRES_PIPELINE_SYNC => Self::PipelineSync,
            pq::PGRES_PIPELINE_ABORTED => Self::PipelineAborted,
            _ => Self::BadResponse,
        }
    }
}

/// One owned result message from libpq. Cleared on drop.
pub struct LibpqResult {
    res: *mut pq::PGresult,
}

impl LibpqResult {
    /// Completion status of the statement this result answers.
    pub fn status(&self) -> ResultStatus {
        ResultStatus::from_raw(unsafe { pq::PQresultStatus(self.res) })
    }

    /// Number of rows.
    pub fn ntuples(&self) -> usize {
        unsafe { pq::PQntuples(self.res) as usize }
    }

    /// Number of columns.
    pub fn nfields(&self) -> usize {
        unsafe { pq::PQnfields(self.res) as usize }
    }

    /// Whether the value at `(row, col)` is SQL NULL.
    pub fn is_null(&self, row: usize, col: usize) -> bool {
        unsafe { pq::PQgetisnull(self.res, row as c_int, col as c_int) == 1 }
    }

    /// The value bytes at `(row, col)`, or `None` for SQL NULL.
    pub fn value(&self, row: usize, col: usize) -> Option<&[u8]> {
        if self.is_null(row, col) {
            return None;
        }
        unsafe {
            let len = pq::PQgetlength(self.res, row as c_int, col as c_int) as usize;
            let ptr = pq::PQgetvalue(self.res, row as c_int, col as c_int);
            Some(std::slice::from_raw_parts(ptr as *const u8, len))
        }
    }

    /// The value at `(row, col)` as UTF-8 text, or `None` for SQL NULL.
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.value(row, col)
            .map(|bytes| std::str::from_utf8(bytes).unwrap_or(""))
    }
}

impl PqResult for LibpqResult {
    fn is_sync_point(&self) -> bool {
        self.status() == ResultStatus::PipelineSync
    }
}

impl Drop for LibpqResult {
    fn drop(&mut self) {
        unsafe { pq::PQclear(self.res) }
    }
}

impl std::fmt::Debug for LibpqResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibpqResult")
            .field("status", &self.status())
            .field("ntuples", &self.ntuples())
            .finish()
    }
}

/// Engine handle over a libpq connection object.
///
/// The handle owns the connection and with it the socket; dropping it runs
/// `PQfinish`, which closes the descriptor.
pub struct LibpqEngine {
    conn: *mut pq::PGconn,
}

impl LibpqEngine {
    /// Begin a non-blocking connection attempt for `conninfo`.
    ///
    /// The returned handle may already be in a bad state; the handshake
    /// checks [`status_ok`](PqEngine::status_ok) before polling. A no-op
    /// notice processor is installed so server notices never reach stderr.
    pub fn start(conninfo: &str) -> Result<Self> {
        let conninfo = CString::new(conninfo).map_err(|_| Error::PqStatus)?;
        let conn = unsafe { pq::PQconnectStart(conninfo.as_ptr()) };
        if conn.is_null() {
            return Err(Error::PqStatus);
        }
        unsafe {
            pq::PQsetNoticeProcessor(conn, quiet_notice_processor, ptr::null_mut());
        }
        Ok(Self { conn })
    }
}

impl PqEngine for LibpqEngine {
    type Result = LibpqResult;

    fn status_ok(&self) -> bool {
        unsafe { pq::PQstatus(self.conn) != pq::CONNECTION_BAD }
    }

    fn socket(&self) -> RawFd {
        unsafe { pq::PQsocket(self.conn) }
    }

    fn set_nonblocking(&mut self) -> Result<()> {
        match unsafe { pq::PQsetnonblocking(self.conn, 1) } {
            0 => Ok(()),
            _ => Err(Error::PqSetNonblocking),
        }
    }

    fn poll_connect(&mut self) -> Polling {
        match unsafe { pq::PQconnectPoll(self.conn) } {
            pq::PGRES_POLLING_READING => Polling::Reading,
            pq::PGRES_POLLING_WRITING => Polling::Writing,
            pq::PGRES_POLLING_OK => Polling::Ok,
            _ => Polling::Failed,
        }
    }

    fn enter_pipeline_mode(&mut self) -> Result<()> {
        match unsafe { pq::PQenterPipelineMode(self.conn) } {
            1 => Ok(()),
            _ => Err(Error::PqEnterPipelineMode),
        }
    }

    fn send_query_params(&mut self, command: &str, params: &[Param]) -> Result<()> {
        let command = CString::new(command).map_err(|_| Error::PqSendQueryParams)?;

        let types: Vec<pq::Oid> = params.iter().map(|p| p.oid).collect();
        let values: Vec<*const c_char> = params
            .iter()
            .map(|p| {
                p.value
                    .as_deref()
                    .map_or(ptr::null(), |v| v.as_ptr() as *const c_char)
            })
            .collect();
        let lengths: Vec<c_int> = params
            .iter()
            .map(|p| p.value.as_deref().map_or(0, |v| v.len() as c_int))
            .collect();
        let formats: Vec<c_int> = params
            .iter()
            .map(|p| if p.binary { 1 } else { 0 })
            .collect();

        let sent = unsafe {
            pq::PQsendQueryParams(
                self.conn,
                command.as_ptr(),
                params.len() as c_int,
                if types.is_empty() { ptr::null() } else { types.as_ptr() },
                if values.is_empty() { ptr::null() } else { values.as_ptr() },
                if lengths.is_empty() { ptr::null() } else { lengths.as_ptr() },
                if formats.is_empty() { ptr::null() } else { formats.as_ptr() },
                0,
            )
        };
        match sent {
            1 => Ok(()),
            _ => Err(Error::PqSendQueryParams),
        }
    }

    fn pipeline_sync(&mut self) -> Result<()> {
        match unsafe { pq::PQpipelineSync(self.conn) } {
            1 => Ok(()),
            _ => Err(Error::PqPipelineSync),
        }
    }

    fn flush(&mut self) -> Result<Flush> {
        match unsafe { pq::PQflush(self.conn) } {
            0 => Ok(Flush::Done),
            1 => Ok(Flush::Again),
            _ => Err(Error::Io(std::io::Error::last_os_error())),
        }
    }

    fn consume_input(&mut self) -> Result<()> {
        match unsafe { pq::PQconsumeInput(self.conn) } {
            1 => Ok(()),
            _ => Err(Error::PqConsumeInput),
        }
    }

    fn is_busy(&self) -> bool {
        unsafe { pq::PQisBusy(self.conn) == 1 }
    }

    fn get_result(&mut self) -> Option<LibpqResult> {
        let res = unsafe { pq::PQgetResult(self.conn) };
        if res.is_null() {
            None
        } else {
            Some(LibpqResult { res })
        }
    }

    fn error_message(&self) -> String {
        unsafe { CStr::from_ptr(pq::PQerrorMessage(self.conn)) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for LibpqEngine {
    fn drop(&mut self) {
        unsafe { pq::PQfinish(self.conn) }
    }
}
