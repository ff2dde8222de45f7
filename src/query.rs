//! Statements and pre-encoded parameters.
//!
//! Encoding typed values into wire bytes is the business of a layer above
//! this crate; the core forwards the oid/bytes/format triples to the engine
//! untouched.

/// A pre-encoded statement parameter.
#[derive(Debug, Clone, Default)]
pub struct Param {
    /// Type oid, or `0` to let the server infer the type.
    pub oid: u32,
    /// Encoded value bytes; `None` is SQL NULL.
    pub value: Option<Vec<u8>>,
    /// Whether `value` is in binary rather than text format.
    pub binary: bool,
}

impl Param {
    /// A text-format parameter of inferred type.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            oid: 0,
            value: Some(value.into().into_bytes()),
            binary: false,
        }
    }

    /// A binary-format parameter of the given type oid.
    pub fn binary(oid: u32, value: impl Into<Vec<u8>>) -> Self {
        Self {
            oid,
            value: Some(value.into()),
            binary: true,
        }
    }

    /// A NULL parameter of inferred type.
    pub fn null() -> Self {
        Self::default()
    }
}

/// A single statement submitted through
/// [`Connection::query`](crate::Connection::query).
///
/// The referenced command text and parameters must stay valid until the
/// submission future resolves or is dropped.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// Command text.
    pub command: &'a str,
    /// Pre-encoded parameters referenced by `$1..$n`.
    pub params: &'a [Param],
}

impl<'a> Query<'a> {
    /// A parameterless statement.
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            params: &[],
        }
    }

    /// A statement with pre-encoded parameters.
    pub fn with_params(command: &'a str, params: &'a [Param]) -> Self {
        Self { command, params }
    }
}

impl<'a> From<&'a str> for Query<'a> {
    fn from(command: &'a str) -> Self {
        Self::new(command)
    }
}

/// One position of a pipelined batch.
///
/// The `result` slot is filled by
/// [`Connection::exec_pipeline`](crate::Connection::exec_pipeline) when the
/// whole batch completes; it stays `None` if the batch fails or the
/// submission is cancelled.
#[derive(Debug)]
pub struct PipelinedQuery<R> {
    /// Command text.
    pub command: String,
    /// Pre-encoded parameters referenced by `$1..$n`.
    pub params: Vec<Param>,
    /// The statement's result, present after successful completion.
    pub result: Option<R>,
}

impl<R> PipelinedQuery<R> {
    /// A parameterless batch position.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: Vec::new(),
            result: None,
        }
    }

    /// A batch position with pre-encoded parameters.
    pub fn with_params(command: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            command: command.into(),
            params,
            result: None,
        }
    }

    /// Take the filled result slot.
    pub fn take_result(&mut self) -> Option<R> {
        self.result.take()
    }
}
