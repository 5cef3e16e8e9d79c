//! Pipeline counters kept in a process-wide prometheus registry.

use std::sync::OnceLock;

use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::error::{Error, Result};

const REGISTRY_PREFIX: &str = "catalogflow";

const RECORDS_DECODED: &str = "records_decoded";
const DECODE_ERRORS: &str = "decode_errors";
const BATCHES_DISPATCHED: &str = "batches_dispatched";
const DISPATCH_ERRORS: &str = "dispatch_errors";
const BULK_ITEM_FAILURES: &str = "bulk_item_failures";

pub(crate) const SINK_LABEL: &str = "sink";
pub(crate) const INDEX_LABEL: &str = "index";

type Labels = Vec<(String, String)>;

struct GlobalRegistry {
    registry: Mutex<Registry>,
}

impl GlobalRegistry {
    fn new() -> Self {
        GlobalRegistry {
            registry: Mutex::new(Registry::with_prefix(REGISTRY_PREFIX)),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL_REGISTRY.get_or_init(GlobalRegistry::new)
}

pub(crate) struct PipelineMetrics {
    pub(crate) records_decoded: Counter,
    pub(crate) decode_errors: Counter,
    pub(crate) batches_dispatched: Family<Labels, Counter>,
    pub(crate) dispatch_errors: Family<Labels, Counter>,
    pub(crate) bulk_item_failures: Family<Labels, Counter>,
}

impl PipelineMetrics {
    fn new() -> Self {
        let metrics = Self {
            records_decoded: Counter::default(),
            decode_errors: Counter::default(),
            batches_dispatched: Family::<Labels, Counter>::default(),
            dispatch_errors: Family::<Labels, Counter>::default(),
            bulk_item_failures: Family::<Labels, Counter>::default(),
        };

        let mut registry = global_registry().registry.lock();
        registry.register(
            RECORDS_DECODED,
            "Total number of feed rows decoded into records",
            metrics.records_decoded.clone(),
        );
        registry.register(
            DECODE_ERRORS,
            "Total number of feed rows that failed to decode",
            metrics.decode_errors.clone(),
        );
        registry.register(
            BATCHES_DISPATCHED,
            "Total number of batches handed to a sink",
            metrics.batches_dispatched.clone(),
        );
        registry.register(
            DISPATCH_ERRORS,
            "Total number of batches the sink failed to accept",
            metrics.dispatch_errors.clone(),
        );
        registry.register(
            BULK_ITEM_FAILURES,
            "Total number of bulk items still failing after retries",
            metrics.bulk_item_failures.clone(),
        );
        metrics
    }
}

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

pub(crate) fn pipeline_metrics() -> &'static PipelineMetrics {
    PIPELINE_METRICS.get_or_init(PipelineMetrics::new)
}

pub(crate) fn sink_labels(sink: &str) -> Labels {
    vec![(SINK_LABEL.to_string(), sink.to_string())]
}

pub(crate) fn index_labels(index: &str) -> Labels {
    vec![(INDEX_LABEL.to_string(), index.to_string())]
}

/// Renders every registered metric in the prometheus text format.
pub fn encode_metrics() -> Result<String> {
    // make sure the pipeline counters exist even before the first record
    pipeline_metrics();

    let mut buffer = String::new();
    let registry = global_registry().registry.lock();
    encode(&mut buffer, &registry).map_err(|e| Error::Metrics(format!("encoding metrics: {e}")))?;
    Ok(buffer)
}
