use std::sync::Arc;

use tracing::{debug, error, info};

use crate::core::error::{IndexerError, Result};
use crate::core::storage::{RowStore, Table};
use crate::storage::encoding::{decode_reverse_block_key, prefix_range};
use crate::storage::reader::IndexReader;
use crate::storage::schema::keys;
use crate::utils::metrics::IndexerMetrics;

/// Verifies that the block keyspace of a table is contiguous.
///
/// Both the canonical rows in the data table (`<chain>:B:<revBlock>`) and the
/// raw snapshots in the blocks table (`<chain>:<revBlock>`) are walked newest
/// first, keys only.
pub struct EvmGapChecker {
    reader: IndexReader,
    metrics: Arc<dyn IndexerMetrics>,
}

impl EvmGapChecker {
    pub fn new(reader: IndexReader, metrics: Arc<dyn IndexerMetrics>) -> Self {
        Self { reader, metrics }
    }

    fn block_prefix(&self, table: Table) -> Result<String> {
        let chain = self.reader.chain();
        match table {
            Table::Data => Ok(keys::blocks_prefix(chain)),
            Table::Blocks => Ok(keys::raw_blocks_prefix(chain)),
            Table::MetadataUpdates => Err(IndexerError::MalformedInput(
                "the metadata_updates table holds no block keys".to_string(),
            )),
        }
    }

    /// Scans the newest `lookback` block keys of `table` (all of them when
    /// `lookback` is zero) and fails with [`IndexerError::BlockGap`] at the
    /// first pair of neighbours that are not consecutive.
    pub async fn check_for_gaps(&self, table: Table, lookback: usize) -> Result<()> {
        let prefix = self.block_prefix(table)?;
        let scanned = {
            let prefix = prefix.clone();
            self.reader
                .blocking(move |store| find_gap(store, table, &prefix, lookback))
                .await?
        };

        match scanned {
            GapScan::Contiguous { checked, newest } => {
                debug!(
                    table = table.as_str(),
                    checked,
                    newest = ?newest,
                    "✅ No gaps found"
                );
                Ok(())
            }
            GapScan::Gap { upper, lower } => {
                error!(
                    table = table.as_str(),
                    "❌ Gap found between block {} and block {}",
                    upper,
                    lower
                );
                self.metrics.record_gap_detected(upper, lower);
                Err(IndexerError::BlockGap { upper, lower })
            }
        }
    }

    /// Highest block number present in `table`.
    pub async fn last_block(&self, table: Table) -> Result<Option<u64>> {
        let prefix = self.block_prefix(table)?;
        let last = self
            .reader
            .blocking(move |store| {
                store
                    .scan(table, &prefix_range(&prefix), Some(1), true)?
                    .first()
                    .map(|row| decode_block_number(&row.key, &prefix))
                    .transpose()
            })
            .await?;
        if let Some(number) = last {
            info!(table = table.as_str(), "📦 Last block: {}", number);
        }
        Ok(last)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum GapScan {
    Contiguous { checked: usize, newest: Option<u64> },
    Gap { upper: u64, lower: u64 },
}

fn find_gap(store: &dyn RowStore, table: Table, prefix: &str, lookback: usize) -> Result<GapScan> {
    let mut newest = None;
    let mut previous: Option<u64> = None;
    let mut checked = 0usize;
    let mut gap = None;
    let mut failure = None;

    store.for_each_row(table, &prefix_range(prefix), true, &mut |row| {
        let current = match decode_block_number(&row.key, prefix) {
            Ok(n) => n,
            Err(e) => {
                failure = Some(e);
                return false;
            }
        };
        if let Some(upper) = previous
            && current + 1 != upper
        {
            gap = Some((upper, current));
            return false;
        }
        newest.get_or_insert(current);
        previous = Some(current);
        checked += 1;
        lookback == 0 || checked < lookback
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    Ok(match gap {
        Some((upper, lower)) => GapScan::Gap { upper, lower },
        None => GapScan::Contiguous { checked, newest },
    })
}

fn decode_block_number(key: &str, prefix: &str) -> Result<u64> {
    let encoded = key.strip_prefix(prefix).ok_or_else(|| {
        IndexerError::MalformedInput(format!("key {key} does not start with {prefix}"))
    })?;
    decode_reverse_block_key(encoded)
}
