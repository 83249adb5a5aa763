//! Orchestration for refsync: the per-record pipeline and the sync gateway.
//!
//! A run is pull → process → push. The gateway mirrors remote records into
//! local storage, the pipeline walks each record through fetch → classify →
//! convert → persist, and the gateway then sends every dirty record back.

pub mod pipeline;
pub mod sync;

pub use pipeline::{Pipeline, RunSummary};
pub use sync::{PushSummary, SyncGateway};
