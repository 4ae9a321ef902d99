use async_trait::async_trait;

use crate::core::error::Result;

#[async_trait]
pub trait Cleaner: Send + Sync {
    /// Execute cleanup once
    /// Returns the number of rows deleted
    async fn cleanup(&self) -> Result<usize>;
}
