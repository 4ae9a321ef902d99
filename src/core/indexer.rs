use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::error::Result;

#[async_trait]
pub trait Indexer: Send + Sync {
    /// Transform one raw block and write its rows.
    async fn index_block(&self, block_number: u64) -> Result<()>;

    /// Index `start..=end` and verify the data table has no holes afterwards.
    async fn index_range(&self, start: u64, end: u64) -> Result<()>;

    /// Follow the blocks table until a shutdown signal arrives.
    async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<()>;
}
