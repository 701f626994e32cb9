//! Multi-stage enrichment pipeline: a static graph of stages wired over
//! in-process channels, fronted by a deduplication filter and terminated
//! by an idempotent store sink. Records flow strictly forward; every
//! per-record failure is caught, logged with stage and key, and dropped
//! without touching sibling records.

pub mod dedup;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod sink;
pub mod stage;
