//! An asynchronous pipeline-mode PostgreSQL client core.
//!
//! One stream connection, many outstanding statements: requests are written
//! back-to-back while their results are read concurrently: a full-duplex
//! pipeline. The crate drives a non-blocking, libpq-style protocol engine
//! through a narrow facade ([`PqEngine`]); it does not speak the wire
//! protocol itself.
//!
//! # Features
//!
//! - **Full-duplex pipelining**: a cooperative writer/reader pair multiplexes
//!   every submission over one socket, matching results to submitters in
//!   FIFO order
//! - **Cancellation-tolerant**: dropping a submission future leaves the
//!   connection usable; the abandoned batch drains without touching the
//!   caller's slots
//! - **Pluggable engine**: any non-blocking implementation of [`PqEngine`]
//!   can back a connection; the `libpq` feature provides the production one
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "libpq")]
//! # async fn app() -> async_pq::Result<()> {
//! use async_pq::{Connection, PipelinedQuery};
//!
//! let conn = Connection::connect("postgresql://postgres@localhost:5432").await?;
//!
//! let mut batch = vec![
//!     PipelinedQuery::new("CREATE TABLE phonebook(phone TEXT, name TEXT)"),
//!     PipelinedQuery::new("INSERT INTO phonebook VALUES ('+1 111 444 7777', 'Jake')"),
//!     PipelinedQuery::new("SELECT * FROM phonebook ORDER BY name"),
//! ];
//!
//! tokio::select! {
//!     res = conn.run() => res?,
//!     res = conn.exec_pipeline(&mut batch) => res?,
//! }
//!
//! let listing = batch.last_mut().unwrap().take_result().unwrap();
//! # let _ = listing;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
mod handler;
mod pipeline;
pub mod query;
mod socket;

pub mod connection;

#[cfg(feature = "libpq")]
pub mod libpq;

#[doc(inline)]
pub use connection::Connection;
#[doc(inline)]
pub use engine::{Flush, Polling, PqEngine, PqResult};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use query::{Param, PipelinedQuery, Query};
