use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    chains::evm::{checker::EvmGapChecker, context::EvmIndexerContext, transform::TransformOutput},
    core::{
        error::{IndexerError, Result},
        indexer::Indexer,
        storage::Table,
    },
    utils::{
        format::format_rate,
        retry::{RetryConfig, retry_transient},
    },
};

/// No failed block is pending.
const NO_RESUME: u64 = u64::MAX;

/// Reads raw snapshots from the blocks table and writes their canonical and
/// index rows into the data table.
pub struct EvmIndexer {
    context: EvmIndexerContext,
    checker: EvmGapChecker,
    /// Lowest block of a failed range; the next round starts there instead of
    /// after the newest indexed block.
    resume_from: AtomicU64,
}

impl EvmIndexer {
    pub fn new(context: EvmIndexerContext) -> Self {
        let checker = EvmGapChecker::new(
            context.storage_manager.reader.clone(),
            context.metrics.clone(),
        );
        Self {
            context,
            checker,
            resume_from: AtomicU64::new(NO_RESUME),
        }
    }

    pub fn checker(&self) -> &EvmGapChecker {
        &self.checker
    }

    /// First block the next round indexes: the lowest block of a failed range
    /// if one is pending, otherwise the block after the newest indexed one.
    async fn next_block(&self) -> Result<u64> {
        let start = self.context.config.start_block.max(1);
        let after_last = match self.checker.last_block(Table::Data).await? {
            Some(last) => last.saturating_add(1),
            None => start,
        };
        let resume = self.resume_from.load(Ordering::SeqCst);
        Ok(after_last.min(resume).max(start))
    }

    /// Indexes whatever the blocks table holds beyond the data table, at most
    /// one gap-check window per call. Returns the number of blocks indexed.
    async fn catch_up(&self) -> Result<u64> {
        let Some(head) = self.checker.last_block(Table::Blocks).await? else {
            debug!("No raw blocks stored yet");
            return Ok(0);
        };
        let start = self.next_block().await?;
        if start > head {
            return Ok(0);
        }

        let window = self.context.config.gap_check_lookback.max(1) as u64;
        let end = head.min(start + window - 1);
        self.index_range(start, end).await?;
        Ok(end - start + 1)
    }
}

/// Transforms and writes one block. Markers claimed for a block whose writes
/// fail are released so a later attempt emits them again.
async fn index_one(context: &EvmIndexerContext, block_number: u64) -> Result<usize> {
    let started = Instant::now();
    let manager = &context.storage_manager;

    let raw = manager.reader.raw_block(block_number).await?;
    let TransformOutput {
        data,
        metadata_updates,
        suppressed_marks,
    } = context
        .transformer
        .transform_all(&raw, &context.balance_cache)?;
    let rows = data.len() + metadata_updates.len();
    let markers = metadata_updates.keys.clone();

    let retry = RetryConfig::with_max_attempts(context.config.max_retries);
    let label = format!("block {block_number}");
    let written = async {
        retry_transient(
            &label,
            || manager.writer.write_bulk(Table::Data, data.clone()),
            retry.clone(),
        )
        .await?;
        retry_transient(
            &label,
            || {
                manager
                    .writer
                    .write_bulk(Table::MetadataUpdates, metadata_updates.clone())
            },
            retry.clone(),
        )
        .await
    }
    .await;

    if let Err(e) = written {
        context.balance_cache.forget(&markers);
        return Err(e);
    }

    context
        .metrics
        .record_balance_marks(markers.len(), suppressed_marks);
    context
        .metrics
        .record_block_indexed(block_number, started.elapsed(), rows);
    debug!(block = block_number, rows, "✅ Indexed block in {:?}", started.elapsed());
    Ok(rows)
}

#[async_trait]
impl Indexer for EvmIndexer {
    async fn index_block(&self, block_number: u64) -> Result<()> {
        index_one(&self.context, block_number).await.map(|_| ())
    }

    async fn index_range(&self, start: u64, end: u64) -> Result<()> {
        if start > end {
            return Err(IndexerError::MalformedInput(format!(
                "empty block range {start}..={end}"
            )));
        }

        let started = Instant::now();
        info!("🚀 Indexing blocks {} to {}", start, end);

        let mut tasks = JoinSet::new();
        let mut first_error: Option<IndexerError> = None;
        let mut lowest_failed = NO_RESUME;
        let mut rows = 0usize;
        let mut settle = |joined: std::result::Result<(u64, Result<usize>), tokio::task::JoinError>,
                          first_error: &mut Option<IndexerError>| {
            // A panicked task loses its block number, so the whole range is redone.
            let (number, result) = match joined {
                Ok((number, result)) => (number, result),
                Err(e) => (start, Err(IndexerError::from(e))),
            };
            match result {
                Ok(n) => rows += n,
                Err(e) => {
                    error!(block = number, "❌ Block indexing failed: {}", e);
                    lowest_failed = lowest_failed.min(number);
                    if first_error.is_none() {
                        *first_error = Some(e);
                    }
                }
            }
        };

        for number in start..=end {
            if first_error.is_some() {
                break;
            }
            let permit = self
                .context
                .block_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| IndexerError::Cancelled("block semaphore closed".to_string()))?;
            let context = self.context.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (number, index_one(&context, number).await)
            });
            while let Some(joined) = tasks.try_join_next() {
                settle(joined, &mut first_error);
            }
        }

        // In-flight blocks finish so their cache claims are settled.
        while let Some(joined) = tasks.join_next().await {
            settle(joined, &mut first_error);
        }
        if let Some(e) = first_error {
            self.resume_from.fetch_min(lowest_failed, Ordering::SeqCst);
            warn!("⏪ Next round resumes from block {}", lowest_failed);
            return Err(e);
        }
        let _ = self
            .resume_from
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |resume| {
                (start..=end).contains(&resume).then_some(NO_RESUME)
            });

        let count = (end - start + 1) as usize;
        info!(
            rows,
            "📦 Indexed {} blocks ({})",
            count,
            format_rate(count, started.elapsed())
        );

        // The window reaches `start - 1` and every block written past `end`.
        let newest = self.checker.last_block(Table::Data).await?.unwrap_or(end);
        let lookback = newest.saturating_sub(start).saturating_add(2) as usize;
        self.checker.check_for_gaps(Table::Data, lookback).await
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("🔄 Indexer loop started");

        // A hole left by an earlier process cannot be resumed from memory.
        if let Err(e) = self
            .checker
            .check_for_gaps(Table::Data, self.context.config.gap_check_lookback)
            .await
        {
            error!("🚫 Data table is not contiguous, refusing to start: {}", e);
            return Err(e);
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("🛑 Shutdown signal received, stopping indexer gracefully...");
                    break;
                }
                result = self.catch_up() => match result {
                    Ok(0) => debug!("🔄 Caught up with the blocks table"),
                    Ok(count) => debug!("Indexed {} blocks this round", count),
                    Err(e) if e.is_consistency_fault() => {
                        error!("🚫 Consistency fault, halting ingestion: {}", e);
                        return Err(e);
                    }
                    Err(e) => warn!("⚠️ Indexing round failed: {}", e),
                },
            }

            let purged = self.context.balance_cache.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged balance-update cache");
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("🛑 Shutdown signal received, stopping indexer gracefully...");
                    break;
                }
                _ = tokio::time::sleep(self.context.config.poll_interval()) => {}
            }
        }

        info!("👋 Indexer stopped gracefully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::evm::decoder::SolTransferDecoder;
    use crate::chains::evm::transform::EvmTransformer;
    use crate::config::IndexerConfig;
    use crate::chains::evm::transform::test_support::{ALICE, BOB, block, transfer};
    use crate::core::types::RawBlock;
    use crate::storage::manager::StorageManager;
    use crate::storage::rocksdb::RocksDBStorage;
    use crate::utils::metrics::NoopIndexerMetrics;
    use alloy::primitives::U256;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> IndexerConfig {
        IndexerConfig {
            chain_id: "1".to_string(),
            start_block: 1,
            concurrency: 4,
            batch_size: 10_000,
            write_timeout_secs: 5,
            read_timeout_secs: 5,
            gap_check_lookback: 100,
            poll_interval_secs: 1,
            balance_cache_ttl_secs: 3_600,
            max_retries: 2,
        }
    }

    fn setup() -> (EvmIndexer, EvmIndexerContext, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(RocksDBStorage::new(dir.path().to_str().unwrap()).unwrap());
        let cfg = Arc::new(config());
        let metrics = Arc::new(NoopIndexerMetrics::new());
        let manager = Arc::new(StorageManager::new(
            storage,
            "1",
            metrics.clone(),
            cfg.batch_size,
            cfg.write_timeout(),
            cfg.read_timeout(),
        ));
        let transformer = Arc::new(EvmTransformer::new("1", Arc::new(SolTransferDecoder::new())));
        let context = EvmIndexerContext::new(cfg, manager, transformer, metrics);
        (EvmIndexer::new(context.clone()), context, dir)
    }

    fn raw(number: u64) -> RawBlock {
        let mut tx = transfer(number as u8, ALICE, BOB, number);
        tx.gas_price = U256::from(7u64);
        block(number, vec![tx])
    }

    async fn save(context: &EvmIndexerContext, numbers: impl IntoIterator<Item = u64>) {
        let blocks: Vec<RawBlock> = numbers.into_iter().map(raw).collect();
        context.storage_manager.save_blocks(&blocks).await.unwrap();
    }

    #[tokio::test]
    async fn indexes_a_range_and_checks_for_gaps() {
        let (indexer, context, _dir) = setup();
        save(&context, 1..=6).await;

        indexer.index_range(1, 6).await.unwrap();

        let reader = &context.storage_manager.reader;
        let block = reader.block(4).await.unwrap();
        assert_eq!(block.transaction_count, 1);
        assert_eq!(block.tx_reward, U256::from(7u64 * 21_000));
        assert_eq!(
            indexer.checker().last_block(Table::Data).await.unwrap(),
            Some(6)
        );
        let markers = reader.metadata_updates("", 10).await.unwrap();
        assert_eq!(markers.len(), 3);
    }

    #[tokio::test]
    async fn missing_snapshot_fails_the_range() {
        let (indexer, context, _dir) = setup();
        save(&context, [1, 2, 4]).await;

        let err = indexer.index_range(1, 4).await.unwrap_err();
        assert!(matches!(err, IndexerError::NotFound(_)));
        assert_eq!(indexer.next_block().await.unwrap(), 3);
        assert!(matches!(
            indexer.catch_up().await,
            Err(IndexerError::NotFound(_))
        ));
        assert_eq!(indexer.next_block().await.unwrap(), 3);

        save(&context, [3]).await;
        assert_eq!(indexer.catch_up().await.unwrap(), 2);
        assert_eq!(indexer.next_block().await.unwrap(), 5);
        indexer.checker().check_for_gaps(Table::Data, 0).await.unwrap();
    }

    #[tokio::test]
    async fn run_waits_for_a_missing_snapshot_instead_of_skipping_it() {
        let (indexer, context, _dir) = setup();
        save(&context, [1, 2, 4]).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let indexer = Arc::new(indexer);
        let handle = {
            let indexer = indexer.clone();
            tokio::spawn(async move { indexer.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        let reader = &context.storage_manager.reader;
        assert!(matches!(reader.block(3).await, Err(IndexerError::NotFound(_))));

        save(&context, [3]).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        shutdown_tx.send(()).unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(reader.block(3).await.unwrap().number, 3);
        indexer.checker().check_for_gaps(Table::Data, 0).await.unwrap();
    }

    #[tokio::test]
    async fn run_refuses_to_start_over_a_hole() {
        let (indexer, context, _dir) = setup();
        save(&context, [1, 2, 4]).await;
        indexer.index_range(1, 2).await.unwrap();
        indexer.index_range(4, 4).await.unwrap_err();

        // A restarted process has no pending resume point.
        let restarted = EvmIndexer::new(context.clone());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let err = restarted.run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, IndexerError::BlockGap { upper: 4, lower: 2 }));
    }

    #[tokio::test]
    async fn hole_in_data_table_halts_ingestion() {
        let (indexer, context, _dir) = setup();
        save(&context, [1, 2, 4]).await;

        indexer.index_range(1, 2).await.unwrap();
        let err = indexer.index_range(4, 4).await.unwrap_err();
        assert!(matches!(err, IndexerError::BlockGap { upper: 4, lower: 2 }));
    }

    #[tokio::test]
    async fn run_follows_the_blocks_table_until_shutdown() {
        let (indexer, context, _dir) = setup();
        save(&context, 1..=3).await;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let indexer = Arc::new(indexer);
        let handle = {
            let indexer = indexer.clone();
            tokio::spawn(async move { indexer.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        save(&context, 4..=5).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        shutdown_tx.send(()).unwrap();

        handle.await.unwrap().unwrap();
        assert_eq!(
            indexer.checker().last_block(Table::Data).await.unwrap(),
            Some(5)
        );
    }

    #[tokio::test]
    async fn rejects_inverted_range() {
        let (indexer, _context, _dir) = setup();
        assert!(matches!(
            indexer.index_range(5, 4).await,
            Err(IndexerError::MalformedInput(_))
        ));
    }
}
