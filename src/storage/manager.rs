use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::error::Result;
use crate::core::storage::{BulkMutations, Mutation, RowStore, Table};
use crate::core::types::RawBlock;
use crate::storage::reader::IndexReader;
use crate::storage::rocksdb::RocksDBStorage;
use crate::storage::schema::{DATA_COLUMN, keys};
use crate::storage::writer::BulkWriter;
use crate::utils::metrics::IndexerMetrics;

/// Owns the database handle and the read/write paths built on it.
pub struct StorageManager {
    pub storage: Arc<RocksDBStorage>,
    pub reader: IndexReader,
    pub writer: BulkWriter,
    chain: String,
}

impl StorageManager {
    pub fn new(
        storage: Arc<RocksDBStorage>,
        chain: impl Into<String>,
        metrics: Arc<dyn IndexerMetrics>,
        batch_size: usize,
        write_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        let chain = chain.into();
        let store: Arc<dyn RowStore> = storage.clone();
        Self {
            reader: IndexReader::new(store.clone(), chain.clone(), read_timeout),
            writer: BulkWriter::new(store, metrics, batch_size, write_timeout),
            storage,
            chain,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn store(&self) -> Arc<dyn RowStore> {
        self.storage.clone()
    }

    /// Writes a raw block snapshot under `<chain>:<revBlock>` in the blocks
    /// table, replacing any earlier snapshot of the same height.
    pub async fn save_block(&self, block: &RawBlock) -> Result<()> {
        self.save_blocks(std::slice::from_ref(block)).await
    }

    pub async fn save_blocks(&self, blocks: &[RawBlock]) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }

        let mut bulk = BulkMutations::new();
        for block in blocks {
            let key = keys::raw_block_key(&self.chain, block.number)?;
            bulk.push(key, Mutation::set(DATA_COLUMN, serde_json::to_string(block)?));
        }
        self.writer.write_bulk(Table::Blocks, bulk).await?;

        debug!(
            count = blocks.len(),
            first = blocks[0].number,
            "💾 Saved raw block snapshots"
        );
        Ok(())
    }

    pub fn log_health(&self) -> Result<()> {
        let health = self.storage.health_check()?;
        info!(
            keys = health.num_keys,
            l0_files = health.l0_files,
            healthy = health.is_healthy,
            "📊 Database size: {}",
            self.storage.get_db_size()?
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::IndexerError;
    use crate::utils::metrics::NoopIndexerMetrics;
    use alloy::primitives::{Address, B256, U256};
    use chrono::DateTime;
    use tempfile::TempDir;

    fn raw(number: u64) -> RawBlock {
        RawBlock {
            hash: B256::repeat_byte(number as u8),
            parent_hash: B256::ZERO,
            uncle_hash: B256::ZERO,
            coinbase: Address::ZERO,
            difficulty: U256::ZERO,
            number,
            gas_limit: 1,
            gas_used: 0,
            time: DateTime::from_timestamp(1_600_000_000 + number as i64, 0).unwrap(),
            base_fee: U256::ZERO,
            uncles: Vec::new(),
            transactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn saves_and_reads_back_snapshots() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(RocksDBStorage::new(dir.path().to_str().unwrap()).unwrap());
        let manager = StorageManager::new(
            storage,
            "1",
            Arc::new(NoopIndexerMetrics::new()),
            10_000,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        manager.save_blocks(&[raw(1), raw(2)]).await.unwrap();
        let mut replaced = raw(2);
        replaced.gas_used = 99;
        manager.save_block(&replaced).await.unwrap();

        assert_eq!(manager.reader.raw_block(1).await.unwrap(), raw(1));
        assert_eq!(manager.reader.raw_block(2).await.unwrap().gas_used, 99);
        assert!(matches!(
            manager.reader.raw_block(3).await,
            Err(IndexerError::NotFound(_))
        ));
        assert!(manager.log_health().is_ok());
    }
}
