use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::cleaner::Cleaner;
use crate::core::error::Result;
use crate::core::storage::{BulkMutations, Mutation, Table};
use crate::storage::encoding::prefix_range;
use crate::storage::reader::IndexReader;
use crate::storage::writer::{BulkWriter, DEFAULT_BATCH_SIZE};

/// Deletes every row under a key prefix, one page of keys at a time. Used to
/// wipe a range before a backfill rewrites it.
pub struct PrefixCleaner {
    reader: IndexReader,
    writer: BulkWriter,
    table: Table,
    prefix: String,
    page_size: usize,
}

impl PrefixCleaner {
    pub fn new(
        reader: IndexReader,
        writer: BulkWriter,
        table: Table,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            writer,
            table,
            prefix: prefix.into(),
            page_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn next_page(&self) -> Result<Vec<String>> {
        let table = self.table;
        let range = prefix_range(&self.prefix);
        let limit = self.page_size;
        self.reader
            .blocking(move |store| {
                Ok(store
                    .scan(table, &range, Some(limit), true)?
                    .into_iter()
                    .map(|row| row.key)
                    .collect())
            })
            .await
    }
}

#[async_trait]
impl Cleaner for PrefixCleaner {
    async fn cleanup(&self) -> Result<usize> {
        if self.prefix.is_empty() {
            debug!("Empty prefix, refusing to delete the whole table");
            return Ok(0);
        }

        info!(
            table = self.table.as_str(),
            "🧹 Deleting rows under prefix {}", self.prefix
        );

        let mut deleted = 0;
        loop {
            let keys = self.next_page().await?;
            if keys.is_empty() {
                break;
            }
            let page = keys.len();
            let mutations = vec![Mutation::DeleteRow; page];
            self.writer
                .write_bulk(self.table, BulkMutations { keys, mutations })
                .await?;
            deleted += page;
            debug!(deleted, "Deleted page of {} rows", page);
        }

        info!(
            table = self.table.as_str(),
            "✅ Deleted {} rows under prefix {}", deleted, self.prefix
        );
        Ok(deleted)
    }
}
