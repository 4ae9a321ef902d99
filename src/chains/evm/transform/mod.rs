//! Pure block-to-mutation transforms.
//!
//! Every transform turns one raw block into canonical rows plus pointer index
//! rows for the data table, and balance-update markers for the
//! metadata_updates table. No transform touches storage. A transform either
//! returns its complete output or an error; on error every marker it claimed
//! in the dedup cache is released again.

mod block;
mod builder;
mod itx;
mod token;
mod tx;
mod uncle;

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::debug;

use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::core::decoder::TransferLogDecoder;
use crate::core::error::{IndexerError, Result};
use crate::core::storage::BulkMutations;
use crate::core::types::RawBlock;
use crate::storage::encoding::{
    MAX_INTERNAL_TRANSACTIONS, MAX_LOGS, MAX_TRANSACTIONS, MAX_UNCLES, reverse_block_key,
    reverse_timestamp_key,
};

/// Mutations produced for one block.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransformOutput {
    pub data: BulkMutations,
    pub metadata_updates: BulkMutations,
    /// Markers skipped because the cache had already seen them.
    pub suppressed_marks: usize,
}

impl TransformOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_balance(
        &mut self,
        cache: &BalanceUpdateCache,
        address: &Address,
        token: &[u8],
    ) {
        if !cache.mark(address, token, &mut self.metadata_updates) {
            self.suppressed_marks += 1;
        }
    }

    pub fn merge(&mut self, other: TransformOutput) {
        self.data.extend(other.data);
        self.metadata_updates.extend(other.metadata_updates);
        self.suppressed_marks += other.suppressed_marks;
    }

    pub fn row_count(&self) -> usize {
        self.data.len() + self.metadata_updates.len()
    }
}

/// Block transformer for one EVM chain.
#[derive(Clone)]
pub struct EvmTransformer {
    chain: String,
    decoder: Arc<dyn TransferLogDecoder>,
}

impl EvmTransformer {
    pub fn new(chain: impl Into<String>, decoder: Arc<dyn TransferLogDecoder>) -> Self {
        Self {
            chain: chain.into(),
            decoder,
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Runs every transform over `block` and merges the results. Any failure
    /// aborts the whole block.
    pub fn transform_all(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        validate_block(block)?;

        let steps: [fn(&Self, &RawBlock, &BalanceUpdateCache) -> Result<TransformOutput>; 7] = [
            Self::transform_block,
            Self::transform_tx,
            Self::transform_itx,
            Self::transform_erc20,
            Self::transform_erc721,
            Self::transform_erc1155,
            Self::transform_uncle,
        ];

        let mut output = TransformOutput::new();
        for step in steps {
            match step(self, block, cache) {
                Ok(part) => output.merge(part),
                Err(e) => {
                    cache.forget(&output.metadata_updates.keys);
                    return Err(e);
                }
            }
        }

        debug!(
            block = block.number,
            rows = output.data.len(),
            markers = output.metadata_updates.len(),
            suppressed = output.suppressed_marks,
            "🔧 Transformed block"
        );
        Ok(output)
    }

    /// Runs `build` against a fresh output and releases its cache claims if it
    /// fails part way.
    fn emit<F>(&self, cache: &BalanceUpdateCache, build: F) -> Result<TransformOutput>
    where
        F: FnOnce(&mut TransformOutput) -> Result<()>,
    {
        let mut output = TransformOutput::new();
        match build(&mut output) {
            Ok(()) => Ok(output),
            Err(e) => {
                cache.forget(&output.metadata_updates.keys);
                Err(e)
            }
        }
    }
}

/// Rejects blocks whose ordinals or key axes cannot be encoded, before any
/// marker is claimed.
pub(crate) fn validate_block(block: &RawBlock) -> Result<()> {
    reverse_block_key(block.number)?;
    reverse_timestamp_key(&block.time)?;
    check_count("transactions", block.transactions.len(), MAX_TRANSACTIONS)?;
    check_count("uncles", block.uncles.len(), MAX_UNCLES)?;
    if let Some(uncle) = block.uncles.iter().find(|u| u.number >= block.number) {
        return Err(IndexerError::MalformedInput(format!(
            "uncle {} is not older than including block {}",
            uncle.number, block.number
        )));
    }
    for tx in &block.transactions {
        check_count("logs", tx.logs.len(), MAX_LOGS)?;
        check_count("internal transactions", tx.itx.len(), MAX_INTERNAL_TRANSACTIONS)?;
    }
    Ok(())
}

fn check_count(what: &str, count: usize, max: usize) -> Result<()> {
    if count > max + 1 {
        return Err(IndexerError::MalformedInput(format!(
            "unexpected number of {what}: at most {} allowed but got {count}",
            max + 1
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::chains::evm::decoder::SolTransferDecoder;
    use crate::core::table::{BlockIndexed, TransactionIndexed};
    use crate::core::types::RawUncle;
    use crate::storage::schema::keys;
    use alloy::primitives::{B256, Bytes, U256};

    fn transformer() -> EvmTransformer {
        EvmTransformer::new("1", Arc::new(SolTransferDecoder::new()))
    }

    #[test]
    fn block_with_contract_creation_and_miner_payment() {
        let mut plain = transfer(0x10, ALICE, BOB, 1);
        plain.data = Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0x00]);

        let mut creation = transfer(0x11, ALICE, BOB, 0);
        creation.to = None;
        creation.contract_address = Some(CREATED);
        creation.data = Bytes::from(vec![0x60, 0x80, 0x60, 0x40]);
        creation.gas_used = 500_000;
        creation.itx = vec![call("[]", ALICE, CREATED, 0), call("[0]", CREATED, MINER, 77)];

        let raw = block(100, vec![plain, creation]);
        let cache = BalanceUpdateCache::default();
        let output = transformer().transform_all(&raw, &cache).unwrap();

        let indexed: BlockIndexed = record(&output.data, &keys::block_key("1", 100).unwrap());
        assert_eq!(indexed.uncle_count, 0);
        assert_eq!(indexed.transaction_count, 2);
        assert_eq!(indexed.mev, U256::from(77u64));

        let canonical_txs = output
            .data
            .keys
            .iter()
            .filter(|k| k.starts_with("1:TX:"))
            .count();
        assert_eq!(canonical_txs, 2);

        let created: TransactionIndexed =
            record(&output.data, &keys::transaction_key("1", B256::repeat_byte(0x11)));
        assert!(created.is_contract_creation);
        assert!(created.invokes_contract);
        assert_eq!(created.to, CREATED);

        let alice = "a1".repeat(20);
        for (hash, rev_tx) in [(0x10u8, "9999"), (0x11, "9998")] {
            let tx_key = keys::transaction_key("1", B256::repeat_byte(hash));
            let rows = pointers(&output.data, &tx_key);
            for tag in ["TIME", "BLOCK", "METHOD"] {
                let prefix = format!("1:I:TX:{alice}:{tag}:");
                assert!(
                    rows.iter().any(|k| k.starts_with(&prefix) && k.ends_with(rev_tx)),
                    "missing {tag} row for tx {hash:#x}"
                );
            }
            let has_contract = rows
                .iter()
                .any(|k| k.starts_with(&format!("1:I:TX:{alice}:CONTRACT:")));
            assert_eq!(has_contract, hash == 0x11);
        }

        // The paid miner appears once even though it is touched twice.
        let miner_marker = keys::balance_update_key(MINER, keys::NATIVE_TOKEN);
        assert_eq!(
            output
                .metadata_updates
                .keys
                .iter()
                .filter(|k| **k == miner_marker)
                .count(),
            1
        );
        assert!(output.suppressed_marks > 0);
    }

    #[test]
    fn oversized_block_fails_without_marking() {
        let mut raw = block(5, vec![transfer(0x10, ALICE, BOB, 1)]);
        raw.uncles = (0..=MAX_UNCLES as u64)
            .map(|i| RawUncle {
                hash: B256::repeat_byte(0x20),
                number: 4,
                coinbase: Address::new([i as u8; 20]),
                difficulty: U256::ZERO,
                gas_limit: 0,
                gas_used: 0,
                base_fee: U256::ZERO,
                time: raw.time,
            })
            .collect();
        // 100 uncles still encode.
        let cache = BalanceUpdateCache::default();
        assert!(transformer().transform_all(&raw, &cache).is_ok());

        raw.uncles.push(raw.uncles[0].clone());
        let cache = BalanceUpdateCache::default();
        let err = transformer().transform_all(&raw, &cache).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedInput(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn second_transform_of_same_block_suppresses_markers() {
        let raw = block(7, vec![transfer(0x10, ALICE, BOB, 1)]);
        let cache = BalanceUpdateCache::default();
        let transformer = transformer();

        let first = transformer.transform_all(&raw, &cache).unwrap();
        let second = transformer.transform_all(&raw, &cache).unwrap();

        assert!(!first.metadata_updates.is_empty());
        assert!(second.metadata_updates.is_empty());
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn genesis_block_is_rejected() {
        let raw = block(0, Vec::new());
        let cache = BalanceUpdateCache::default();
        assert!(transformer().transform_all(&raw, &cache).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn uncle_not_older_than_its_block_is_rejected() {
        let mut raw = block(9, vec![transfer(0x10, ALICE, BOB, 1)]);
        raw.uncles = vec![RawUncle {
            hash: B256::repeat_byte(0x21),
            number: 9,
            coinbase: Address::new([0x31; 20]),
            difficulty: U256::ZERO,
            gas_limit: 0,
            gas_used: 0,
            base_fee: U256::ZERO,
            time: raw.time,
        }];

        let cache = BalanceUpdateCache::default();
        let err = transformer().transform_all(&raw, &cache).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedInput(_)));
        assert!(cache.is_empty());

        raw.uncles[0].number = u64::MAX;
        assert!(transformer().transform_all(&raw, &cache).is_err());
        assert!(cache.is_empty());
    }
}
