//! Batched puts and deletes.
//!
//! Requests are validated up front; the valid ones are sent as unordered
//! native bulk writes of at most [`MAX_BATCH_WRITE`] operations. Each request
//! gets its own [`BatchItemResult`], and applied writes stay applied when
//! others fail.

use dynamongo_docstore::WriteModel;
use dynamongo_model::{
    AttributeKind, BatchFailureReason, BatchItemResult, Item, ModelSchema, WriteRequest,
};
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::executor::{Adapter, key_filter};

/// Upper bound on operations per native round trip.
pub const MAX_BATCH_WRITE: usize = 25;

/// Collects writes for one table.
#[derive(Debug)]
pub struct BatchWriter<'a> {
    adapter: &'a Adapter,
    schema: &'a ModelSchema,
    requests: Vec<WriteRequest>,
}

/// Per-request outcome of [`BatchWriter::commit`], in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteOutput {
    /// One result per request.
    pub results: Vec<BatchItemResult>,
}

impl BatchWriteOutput {
    /// Requests that were applied.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Positions and reasons of the requests that were not applied.
    #[must_use]
    pub fn failed(&self) -> Vec<(usize, &BatchFailureReason)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r {
                BatchItemResult::Failed { reason } => Some((i, reason)),
                BatchItemResult::Success => None,
            })
            .collect()
    }

    /// `Err(PartialBatchFailure)` when any request failed.
    pub fn into_result(self) -> AdapterResult<Vec<BatchItemResult>> {
        if self.results.iter().all(BatchItemResult::is_success) {
            Ok(self.results)
        } else {
            Err(AdapterError::PartialBatchFailure {
                results: self.results,
            })
        }
    }
}

impl<'a> BatchWriter<'a> {
    pub(crate) fn new(adapter: &'a Adapter, schema: &'a ModelSchema) -> Self {
        Self {
            adapter,
            schema,
            requests: Vec::new(),
        }
    }

    /// Queues a put.
    #[must_use]
    pub fn put(mut self, item: Item) -> Self {
        self.requests.push(WriteRequest::Put(item));
        self
    }

    /// Queues a delete by key.
    #[must_use]
    pub fn delete(mut self, key: Item) -> Self {
        self.requests.push(WriteRequest::Delete(key));
        self
    }

    /// Queues an arbitrary request.
    pub fn push(&mut self, request: WriteRequest) {
        self.requests.push(request);
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Sends every queued request.
    pub fn commit(self) -> AdapterResult<BatchWriteOutput> {
        let store = self.adapter.table(self.schema)?;
        let table = self.schema.table_name.as_str();
        let chunk_size = self.adapter.config().max_batch_write.clamp(1, MAX_BATCH_WRITE);

        let mut results = vec![BatchItemResult::Success; self.requests.len()];
        let mut pending: Vec<(usize, WriteModel)> = Vec::with_capacity(self.requests.len());
        for (i, request) in self.requests.iter().enumerate() {
            match self.prepare(request) {
                Ok(op) => pending.push((i, op)),
                Err(reason) => results[i] = BatchItemResult::Failed { reason },
            }
        }

        for chunk in pending.chunks(chunk_size) {
            let ops = chunk.iter().map(|(_, op)| op.clone()).collect();
            for ((i, _), outcome) in chunk.iter().zip(store.bulk_write(table, ops)) {
                if let Err(e) = outcome {
                    results[*i] = BatchItemResult::Failed {
                        reason: BatchFailureReason::Rejected {
                            message: e.to_string(),
                        },
                    };
                }
            }
        }

        let output = BatchWriteOutput { results };
        debug!(
            table,
            requests = output.results.len(),
            failed = output.results.len() - output.succeeded(),
            "batch write"
        );
        Ok(output)
    }

    fn prepare(&self, request: &WriteRequest) -> Result<WriteModel, BatchFailureReason> {
        let schema = self.schema;
        let item = request.item();
        for name in schema.key_attributes() {
            let Some(value) = item.get(name) else {
                return Err(BatchFailureReason::MissingKey {
                    attribute: name.to_owned(),
                });
            };
            let expected = schema.kind_of(name).unwrap_or_default();
            if !value.is_scalar_key() || !expected.accepts(value) {
                return Err(BatchFailureReason::InvalidKeyType {
                    attribute: name.to_owned(),
                    expected: match expected {
                        AttributeKind::Dynamic => "S, N or B".to_owned(),
                        kind => kind.as_str().to_owned(),
                    },
                    actual: value.type_descriptor().to_owned(),
                });
            }
        }

        let invalid = |e: AdapterError| BatchFailureReason::InvalidItem {
            message: e.to_string(),
        };
        let filter = key_filter(schema, item).map_err(invalid)?;
        match request {
            WriteRequest::Put(item) => Ok(WriteModel::ReplaceOne {
                filter,
                replacement: self.adapter.to_document(schema, item).map_err(invalid)?,
                upsert: true,
            }),
            WriteRequest::Delete(key) => {
                if key.len() != schema.key_attributes().len() {
                    return Err(BatchFailureReason::InvalidItem {
                        message: "a delete takes only the key attributes".to_owned(),
                    });
                }
                Ok(WriteModel::DeleteOne { filter })
            }
        }
    }
}
