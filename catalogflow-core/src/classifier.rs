//! Splits a batch into sub-batches that share a target index and a disposition.

use std::collections::BTreeMap;

use catalogflow_search::{BulkOperation, BulkRequest};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::Settings;
use crate::error::Result;
use crate::record::{Disposition, Record};

/// Where records of a batch are written.
#[derive(Debug, Clone, PartialEq)]
pub enum Routing {
    /// Every record goes to one index regardless of its locale.
    Single { index: String },
    /// Records go to the index of their locale. Unknown locales are dropped.
    Multi { indices: BTreeMap<String, String> },
}

impl Routing {
    pub fn single(index: impl Into<String>) -> Self {
        Routing::Single {
            index: index.into(),
        }
    }

    pub fn multi_locale(settings: &Settings) -> Self {
        Routing::Multi {
            indices: settings.indices.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubBatch {
    pub index: String,
    /// Set only under [Routing::Multi].
    pub locale: Option<String>,
    pub disposition: Disposition,
    pub records: Vec<Record>,
}

impl SubBatch {
    /// `index` operations keyed by sku for upserts, body-less `delete` operations otherwise.
    pub fn to_bulk_request(&self, now: DateTime<Utc>) -> Result<BulkRequest> {
        self.records
            .iter()
            .map(|record| -> Result<BulkOperation> {
                match self.disposition {
                    Disposition::Upsert => {
                        Ok(BulkOperation::index(&record.id, &record.to_doc(now))?)
                    }
                    Disposition::Delete => Ok(BulkOperation::delete(&record.id)),
                }
            })
            .collect()
    }
}

/// Partitions `batch` by (index, disposition), keeping record order within each part and
/// ordering parts by first appearance. Never yields an empty sub-batch.
pub fn classify(batch: Vec<Record>, routing: &Routing) -> Vec<SubBatch> {
    let mut sub_batches: Vec<SubBatch> = Vec::new();

    for record in batch {
        let (index, locale) = match routing {
            Routing::Single { index } => (index.clone(), None),
            Routing::Multi { indices } => {
                let locale = record.language_code.trim().to_lowercase();
                let Some(index) = indices.get(&locale) else {
                    warn!(
                        sku = %record.id,
                        locale = %record.language_code,
                        "Dropping record with unrecognized locale"
                    );
                    continue;
                };
                (index.clone(), Some(locale))
            }
        };
        let disposition = record.disposition();

        match sub_batches
            .iter_mut()
            .find(|sb| sb.index == index && sb.locale == locale && sb.disposition == disposition)
        {
            Some(sub_batch) => sub_batch.records.push(record),
            None => sub_batches.push(SubBatch {
                index,
                locale,
                disposition,
                records: vec![record],
            }),
        }
    }
    sub_batches
}
