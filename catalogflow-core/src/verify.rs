//! Spot-check of an ingested feed: sample the feed, ask the index how many of the sampled
//! skus it holds.

use std::path::PathBuf;

use catalogflow_search::{Query, SearchClient};
use tracing::{info, warn};

use crate::decoder::FeedReader;
use crate::error::{Error, Result};
use crate::estimator::estimate_sample_size;
use crate::record::Record;
use crate::sampler::Reservoir;

const CONFIDENCE: f64 = 0.95;
const MARGIN_OF_ERROR: f64 = 0.05;

/// Counts documents in an index matching a query.
#[trait_variant::make(Counter: Send)]
#[allow(dead_code)]
pub trait LocalCounter {
    async fn count(&self, index: &str, query: &Query) -> Result<u64>;
}

impl Counter for SearchClient {
    async fn count(&self, index: &str, query: &Query) -> Result<u64> {
        Ok(SearchClient::count(self, index, query)
            .await?
            .into_result()?
            .count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub total_rows: usize,
    pub decode_errors: u64,
    pub sample_size: usize,
    pub matched: u64,
}

impl VerifyReport {
    /// Share of the sampled skus found in the index.
    pub fn ratio(&self) -> f64 {
        if self.sample_size == 0 {
            return 0.0;
        }
        self.matched as f64 / self.sample_size as f64
    }
}

/// `bool.should` of one `_id` term per key.
pub fn existence_query<'a>(keys: impl IntoIterator<Item = &'a str>) -> Query {
    Query::bool()
        .should(keys.into_iter().map(|key| Query::term("_id", key)))
        .into()
}

/// Reads the whole feed, skipping rows that fail to decode. Returns the records and the
/// number of skipped rows.
pub fn load_feed(path: impl Into<PathBuf>) -> Result<(Vec<Record>, u64)> {
    let path = path.into();
    let mut records = Vec::new();
    let mut decode_errors = 0;
    for result in FeedReader::open(&path)? {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                decode_errors += 1;
                warn!(%e, "Skipping malformed row");
            }
        }
    }
    Ok((records, decode_errors))
}

/// Samples `records` and counts how many sampled skus `index` holds. `seed` makes the sample
/// reproducible.
pub async fn verify_records<C: Counter + Sync>(
    counter: &C,
    index: &str,
    records: Vec<Record>,
    decode_errors: u64,
    seed: Option<u64>,
) -> Result<VerifyReport> {
    let total_rows = records.len();
    if total_rows == 0 {
        return Err(Error::Verify("feed has no decodable rows".to_string()));
    }
    let k = estimate_sample_size(total_rows, CONFIDENCE, MARGIN_OF_ERROR)?;

    let mut reservoir = match seed {
        Some(seed) => Reservoir::with_seed(k, seed),
        None => Reservoir::new(k),
    };
    reservoir.extend(records);
    let sample = reservoir.into_sample();

    let query = existence_query(sample.iter().map(|r| r.id.as_str()));
    let matched = counter.count(index, &query).await?;

    let report = VerifyReport {
        total_rows,
        decode_errors,
        sample_size: sample.len(),
        matched,
    };
    info!(
        index,
        total_rows,
        sample_size = report.sample_size,
        matched,
        ratio = report.ratio(),
        "Verification finished"
    );
    Ok(report)
}

/// [load_feed] followed by [verify_records].
pub async fn verify_file<C: Counter + Sync>(
    counter: &C,
    index: &str,
    path: impl Into<PathBuf>,
) -> Result<VerifyReport> {
    let path = path.into();
    let (records, decode_errors) = tokio::task::spawn_blocking(move || load_feed(path)).await??;
    verify_records(counter, index, records, decode_errors, None).await
}
