use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

const ACTION_INDEX: &str = "index";
const ACTION_DELETE: &str = "delete";

/// One line pair (or single line, for deletes) of a `_bulk` request body.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Index-or-replace the document stored under `id`.
    Index { id: String, document: Value },
    /// Delete the document stored under `id`. Carries no body.
    Delete { id: String },
}

impl BulkOperation {
    pub fn index<T: Serialize>(id: impl Into<String>, document: &T) -> Result<Self> {
        Ok(BulkOperation::Index {
            id: id.into(),
            document: serde_json::to_value(document)?,
        })
    }

    pub fn delete(id: impl Into<String>) -> Self {
        BulkOperation::Delete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id } => id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            BulkOperation::Index { .. } => ACTION_INDEX,
            BulkOperation::Delete { .. } => ACTION_DELETE,
        }
    }

    fn write_ndjson(&self, out: &mut String) -> Result<()> {
        let mut meta = Map::with_capacity(1);
        meta.insert("_id".to_string(), Value::String(self.id().to_string()));
        let mut action = Map::with_capacity(1);
        action.insert(self.action().to_string(), Value::Object(meta));

        out.push_str(&serde_json::to_string(&action)?);
        out.push('\n');
        if let BulkOperation::Index { document, .. } = self {
            out.push_str(&serde_json::to_string(document)?);
            out.push('\n');
        }
        Ok(())
    }
}

/// An ordered set of operations sent as a single `_bulk` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, operation: BulkOperation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    /// Renders the newline-delimited body. Every line, including the last, ends in `\n`.
    pub fn to_ndjson(&self) -> Result<String> {
        let mut body = String::new();
        for operation in &self.operations {
            operation.write_ndjson(&mut body)?;
        }
        Ok(body)
    }
}

impl From<Vec<BulkOperation>> for BulkRequest {
    fn from(operations: Vec<BulkOperation>) -> Self {
        Self { operations }
    }
}

impl FromIterator<BulkOperation> for BulkRequest {
    fn from_iter<I: IntoIterator<Item = BulkOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkResult {
    pub took: u64,
    pub errors: bool,
    /// One entry per operation, keyed by the action name, in request order.
    pub items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkResponseItem {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl BulkResponseItem {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub reason: String,
    pub index: Option<String>,
    pub shard: Option<String>,
}

impl BulkResult {
    pub fn by_action(&self, action: &str) -> Vec<&BulkResponseItem> {
        self.items.iter().filter_map(|item| item.get(action)).collect()
    }

    pub fn by_id(&self, id: &str) -> Vec<&BulkResponseItem> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|result| result.id == id)
            .collect()
    }

    pub fn indexed(&self) -> Vec<&BulkResponseItem> {
        self.by_action(ACTION_INDEX)
    }

    pub fn deleted(&self) -> Vec<&BulkResponseItem> {
        self.by_action(ACTION_DELETE)
    }

    /// Items whose status is outside 2xx.
    pub fn failed(&self) -> Vec<&BulkResponseItem> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|result| !result.is_success())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&BulkResponseItem> {
        self.items
            .iter()
            .flat_map(|item| item.values())
            .filter(|result| result.is_success())
            .collect()
    }
}
