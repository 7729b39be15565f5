//! `bunnydb-runner` runs blocks of SQL against a Bunny.net Database over a
//! single stateful pipeline stream.
//!
//! - [`segment()`] splits SQL text into statements and [`locate()`] finds the one
//!   under a caret.
//! - [`BunnyDbClient::run_statements`] executes statements one after another,
//!   reporting progress and collecting per-statement outcomes.
//! - [`PipelineResult::schema_changed`] tells whether cached schema metadata
//!   should be reloaded.

mod client;
mod decode;
mod error;
mod executor;
mod options;
mod params;
mod pipeline;
mod row_map;
mod schema;
mod segment;
mod stream;
mod transport;
mod types;
mod value;

pub mod wire;

#[cfg(test)]
mod testing;

pub use client::{db_id_to_pipeline_url, quote_identifier, BunnyDbClient};
pub use error::BunnyDbError;
pub use executor::execute;
pub use options::ClientOptions;
pub use params::Params;
pub use pipeline::{
    run, run_cancellable, CancelFlag, LogEntry, PipelineResult, QueryProgress, RunStatus,
    StatementResult,
};
pub use row_map::RowRef;
pub use schema::has_schema_change;
pub use segment::{locate, segment, Dialect, Statement};
pub use stream::{StreamConnection, StreamHandle};
pub use transport::{HttpTransport, Transport};
pub use types::{Col, ExecutionStats, QueryError, QueryOutcome, ResultSet, SchemaItem};
pub use value::Value;

pub type Result<T> = std::result::Result<T, BunnyDbError>;
