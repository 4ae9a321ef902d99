use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::core::error::{IndexerError, Result};
use crate::core::storage::{Row, RowRange, RowStore, Table};
use crate::core::table::{
    BlockIndexed, Erc20Indexed, Erc721Indexed, Erc1155Indexed, InternalTransactionIndexed,
    TransactionIndexed, UncleIndexed,
};
use crate::core::types::RawBlock;
use crate::storage::encoding::{open_range, prefix_range, prefix_successor};
use crate::storage::schema::{DATA_COLUMN, IndexFilter, IndexKind, keys, normalize_address};

/// One page of records plus the token for the next page. An empty token ends
/// pagination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next_token: String,
}

impl<T> Page<T> {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            next_token: String::new(),
        }
    }
}

/// Read side of the data and blocks tables. Every call runs on the blocking
/// pool under the configured deadline.
#[derive(Clone)]
pub struct IndexReader {
    store: Arc<dyn RowStore>,
    chain: String,
    timeout: Duration,
}

impl IndexReader {
    pub fn new(store: Arc<dyn RowStore>, chain: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            chain: chain.into(),
            timeout,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub(crate) async fn blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn RowStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || f(store.as_ref())),
        )
        .await
        {
            Ok(joined) => joined?,
            Err(_) => Err(IndexerError::DeadlineExceeded(self.timeout)),
        }
    }

    /// First-page token for an address view. Defaults to the TIME filter.
    pub fn initial_token(
        &self,
        kind: IndexKind,
        address: &str,
        filter: Option<IndexFilter>,
    ) -> String {
        keys::index_page_prefix(
            &self.chain,
            kind,
            &normalize_address(address),
            filter.unwrap_or(IndexFilter::Time),
        )
    }

    /// Two-phase page read: scan index rows after `token`, then fetch the
    /// canonical rows their column names point at.
    pub async fn page<T>(&self, token: &str, segment_count: usize, limit: usize) -> Result<Page<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if token.is_empty() || limit == 0 {
            return Ok(Page::empty());
        }
        let token = token.to_string();
        self.blocking(move |store| read_page(store, &token, segment_count, limit))
            .await
    }

    pub async fn transactions_for_address(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Page<TransactionIndexed>> {
        self.page(token, IndexKind::Transaction.prefix_segments(), limit)
            .await
    }

    pub async fn blocks_for_address(&self, token: &str, limit: usize) -> Result<Page<BlockIndexed>> {
        self.page(token, IndexKind::Block.prefix_segments(), limit)
            .await
    }

    pub async fn uncles_for_address(&self, token: &str, limit: usize) -> Result<Page<UncleIndexed>> {
        self.page(token, IndexKind::Uncle.prefix_segments(), limit)
            .await
    }

    pub async fn internal_transactions_for_address(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Page<InternalTransactionIndexed>> {
        self.page(token, IndexKind::InternalTransaction.prefix_segments(), limit)
            .await
    }

    pub async fn erc20_for_address(&self, token: &str, limit: usize) -> Result<Page<Erc20Indexed>> {
        self.page(token, IndexKind::Erc20.prefix_segments(), limit)
            .await
    }

    pub async fn erc721_for_address(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Page<Erc721Indexed>> {
        self.page(token, IndexKind::Erc721.prefix_segments(), limit)
            .await
    }

    pub async fn erc1155_for_address(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Page<Erc1155Indexed>> {
        self.page(token, IndexKind::Erc1155.prefix_segments(), limit)
            .await
    }

    /// Number of index rows for an address and filter.
    pub async fn count_for_address(
        &self,
        kind: IndexKind,
        address: &str,
        filter: IndexFilter,
    ) -> Result<u64> {
        let prefix =
            keys::index_count_prefix(&self.chain, kind, &normalize_address(address), filter);
        self.blocking(move |store| {
            let mut count = 0u64;
            store.for_each_row(Table::Data, &prefix_range(&prefix), true, &mut |_| {
                count += 1;
                true
            })?;
            Ok(count)
        })
        .await
    }

    pub async fn block(&self, number: u64) -> Result<BlockIndexed> {
        let key = keys::block_key(&self.chain, number)?;
        self.blocking(move |store| match store.read_row(Table::Data, &key)? {
            Some(row) => decode_data_cell(&row),
            None => Err(IndexerError::NotFound(key)),
        })
        .await
    }

    /// Up to `limit` canonical blocks starting at `start` and walking down.
    pub async fn blocks_descending(&self, start: u64, limit: usize) -> Result<Vec<BlockIndexed>> {
        let start_key = keys::block_key(&self.chain, start)?;
        let prefix = keys::blocks_prefix(&self.chain);
        self.blocking(move |store| {
            let range = RowRange::new(start_key, prefix_successor(prefix.as_bytes(), usize::MAX));
            store
                .scan(Table::Data, &range, Some(limit), false)?
                .iter()
                .map(decode_data_cell)
                .collect()
        })
        .await
    }

    /// Newest canonical block, `None` on an empty table.
    pub async fn most_recent_block(&self) -> Result<Option<BlockIndexed>> {
        let prefix = keys::blocks_prefix(&self.chain);
        self.blocking(move |store| {
            store
                .scan(Table::Data, &prefix_range(&prefix), Some(1), false)?
                .first()
                .map(decode_data_cell)
                .transpose()
        })
        .await
    }

    pub async fn raw_block(&self, number: u64) -> Result<RawBlock> {
        let key = keys::raw_block_key(&self.chain, number)?;
        self.blocking(move |store| match store.read_row(Table::Blocks, &key)? {
            Some(row) => decode_data_cell(&row),
            None => Err(IndexerError::NotFound(key)),
        })
        .await
    }

    /// Balance-update marker keys in key order, starting at `start_token`.
    pub async fn metadata_updates(&self, start_token: &str, limit: usize) -> Result<Vec<String>> {
        let range = RowRange::new(start_token, "");
        self.blocking(move |store| {
            Ok(store
                .scan(Table::MetadataUpdates, &range, Some(limit), true)?
                .into_iter()
                .map(|row| row.key)
                .collect())
        })
        .await
    }
}

fn read_page<T: DeserializeOwned>(
    store: &dyn RowStore,
    token: &str,
    segment_count: usize,
    limit: usize,
) -> Result<Page<T>> {
    let index_rows = store.scan(
        Table::Data,
        &open_range(token, segment_count),
        Some(limit),
        true,
    )?;

    let Some(last) = index_rows.last() else {
        return Ok(Page::empty());
    };
    let next_token = last.key.clone();

    let mut pointers = Vec::with_capacity(index_rows.len());
    for row in &index_rows {
        let canonical = row.first_column().ok_or_else(|| {
            IndexerError::StorageLayout(format!("index row {} has no pointer column", row.key))
        })?;
        pointers.push((row.key.as_str(), canonical.to_string()));
    }

    let mut wanted: Vec<String> = pointers.iter().map(|(_, c)| c.clone()).collect();
    wanted.sort();
    wanted.dedup();
    let canonical: HashMap<String, Row> = store
        .read_rows(Table::Data, &wanted)?
        .into_iter()
        .map(|row| (row.key.clone(), row))
        .collect();

    let mut records = Vec::with_capacity(pointers.len());
    for (index_key, canonical_key) in pointers {
        let Some(row) = canonical.get(&canonical_key) else {
            error!(
                index_key,
                canonical_key = %canonical_key,
                "❌ Index row points at a missing record"
            );
            return Err(IndexerError::IndexDivergence {
                index_key: index_key.to_string(),
                canonical_key,
            });
        };
        records.push(decode_data_cell(row)?);
    }

    debug!(token, records = records.len(), "Read index page");
    Ok(Page {
        records,
        next_token,
    })
}

fn decode_data_cell<T: DeserializeOwned>(row: &Row) -> Result<T> {
    let cell = row.cell(DATA_COLUMN).ok_or_else(|| {
        IndexerError::StorageLayout(format!("row {} has no {DATA_COLUMN} column", row.key))
    })?;
    Ok(serde_json::from_str(&cell.value)?)
}
