//! Catalog feed ingestion.
//!
//! A blocking producer decodes feed rows into [record::Record]s and pushes them into a bounded
//! [queue]. The [accumulator::BatchAccumulator] pulls them, cuts fixed-size batches and hands each
//! batch to a [sink::BatchSink]: published to the bus, written to the search indices, or logged.
//! [verify] samples an ingested feed and checks how much of it the index holds.

mod backoff;
mod error;

pub use crate::error::{Error, Result};

pub mod accumulator;
pub mod classifier;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod estimator;
pub mod metrics;
pub mod pipeline;
pub mod producer;
pub mod provision;
pub mod queue;
pub mod record;
pub mod sampler;
pub mod sink;
pub mod verify;
