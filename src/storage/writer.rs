use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error};

use crate::core::error::{IndexerError, Result};
use crate::core::storage::{BulkMutations, RowStore, Table};
use crate::utils::metrics::IndexerMetrics;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Applies bulk mutations in fixed-size chunks, each under its own deadline.
///
/// A failed chunk fails the whole call. Chunks applied before the failure stay
/// applied; callers retry the complete batch, which is safe because every
/// mutation overwrites its row.
#[derive(Clone)]
pub struct BulkWriter {
    store: Arc<dyn RowStore>,
    metrics: Arc<dyn IndexerMetrics>,
    batch_size: usize,
    timeout: Duration,
}

impl BulkWriter {
    pub fn new(
        store: Arc<dyn RowStore>,
        metrics: Arc<dyn IndexerMetrics>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub async fn write_bulk(&self, table: Table, bulk: BulkMutations) -> Result<()> {
        let BulkMutations { keys, mutations } = bulk;
        if keys.len() != mutations.len() {
            return Err(IndexerError::BulkLengthMismatch {
                keys: keys.len(),
                mutations: mutations.len(),
            });
        }
        if keys.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let total = keys.len();
        let mut batches = 0;

        for (chunk_keys, chunk_mutations) in keys
            .chunks(self.batch_size)
            .zip(mutations.chunks(self.batch_size))
        {
            let store = Arc::clone(&self.store);
            let chunk_keys = chunk_keys.to_vec();
            let chunk_mutations = chunk_mutations.to_vec();

            let apply = tokio::task::spawn_blocking(move || {
                store.apply_bulk(table, &chunk_keys, &chunk_mutations)
            });

            let outcome = match timeout(self.timeout, apply).await {
                Ok(joined) => joined.map_err(IndexerError::from).and_then(|r| r),
                Err(_) => Err(IndexerError::DeadlineExceeded(self.timeout)),
            };

            if let Err(e) = outcome {
                error!(
                    table = table.as_str(),
                    batch = batches,
                    rows = total,
                    "❌ Bulk write failed: {}",
                    e
                );
                self.metrics.record_bulk_write_failure(table.as_str());
                return Err(e);
            }
            batches += 1;
        }

        debug!(
            table = table.as_str(),
            rows = total,
            batches,
            "Bulk write completed in {:?}",
            started.elapsed()
        );
        self.metrics
            .record_bulk_write(table.as_str(), started.elapsed(), total, batches);
        Ok(())
    }
}
