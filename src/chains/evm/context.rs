use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{
    chains::evm::{balance_cache::BalanceUpdateCache, transform::EvmTransformer},
    config::IndexerConfig,
    storage::manager::StorageManager,
    utils::metrics::IndexerMetrics,
};

/// Shared handles for every task of one chain's indexer.
#[derive(Clone)]
pub struct EvmIndexerContext {
    pub config: Arc<IndexerConfig>,
    pub storage_manager: Arc<StorageManager>,
    pub transformer: Arc<EvmTransformer>,
    pub balance_cache: Arc<BalanceUpdateCache>,
    pub metrics: Arc<dyn IndexerMetrics>,
    pub block_semaphore: Arc<Semaphore>,
}

impl EvmIndexerContext {
    pub fn new(
        config: Arc<IndexerConfig>,
        storage_manager: Arc<StorageManager>,
        transformer: Arc<EvmTransformer>,
        metrics: Arc<dyn IndexerMetrics>,
    ) -> Self {
        let balance_cache = Arc::new(BalanceUpdateCache::new(config.balance_cache_ttl()));
        let block_semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            storage_manager,
            transformer,
            balance_cache,
            metrics,
            block_semaphore,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }
}
