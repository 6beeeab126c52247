//! Ingestion pipeline for rowpipe.
//!
//! Two entry points share one validation and enrichment core:
//! - [`batch::BatchIngestor`] reads a delimited object and persists each row
//! - [`api::RecordService`] turns a single JSON payload into one record
//!
//! [`context::Pipeline`] builds both from an [`rowpipe_shared::AppConfig`].

pub mod api;
pub mod batch;
pub mod clock;
pub mod context;
pub mod decoder;
pub mod enricher;
pub mod server;
pub mod validator;

mod outcome;

#[cfg(test)]
mod test_support;

pub use api::{ApiRequest, ApiResponse, Payload, RecordService};
pub use batch::{BatchIngestor, BatchPhase, ProgressReporter, RowStatus, SilentProgress};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{MEMORY_STORE, Pipeline, open_store};
pub use server::{AppState, MAX_BODY_BYTES, build_router, serve};
