use alloy::hex;
use alloy::primitives::{Address, Bytes, U256};

use super::builder::{IndexFanout, emit_canonical};
use super::{EvmTransformer, TransformOutput, validate_block};
use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::core::error::Result;
use crate::core::table::TransactionIndexed;
use crate::core::types::{RawBlock, RawTransaction};
use crate::storage::encoding::{
    MAX_TRANSACTIONS, reverse_block_key, reverse_index_key, reverse_timestamp_key,
};
use crate::storage::schema::{IndexFilter, IndexKind, keys};

/// Gas used by a plain value transfer.
const TRANSFER_GAS: u64 = 21_000;

impl EvmTransformer {
    /// One `<chain>:TX:<hash>` row per transaction. Both parties get TO/FROM,
    /// TIME, BLOCK and METHOD views; failed transactions add ERROR rows and
    /// deployments add CONTRACT rows.
    pub fn transform_tx(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        validate_block(block)?;
        let block_key = reverse_block_key(block.number)?;
        let time_key = reverse_timestamp_key(&block.time)?;

        self.emit(cache, |out| {
            for (i, tx) in block.transactions.iter().enumerate() {
                let tx_index = reverse_index_key(i, MAX_TRANSACTIONS)?;
                let record = index_transaction(block, tx);
                let from = record.from;
                let to = record.to;
                let method = hex::encode(&record.method_id);

                let suffix = [time_key.clone(), tx_index.clone()];
                let by_block = [block_key.as_str(), tx_index.as_str()];
                let by_method = [method.as_str(), time_key.as_str(), tx_index.as_str()];

                let mut fanout = IndexFanout::new(&self.chain, IndexKind::Transaction, &suffix)
                    .parties(&from, &to)
                    .custom(&from, IndexFilter::Block, &by_block)
                    .custom(&to, IndexFilter::Block, &by_block)
                    .custom(&from, IndexFilter::Method, &by_method)
                    .custom(&to, IndexFilter::Method, &by_method);
                if !record.error_msg.is_empty() {
                    fanout = fanout
                        .owner(&from, IndexFilter::Error)
                        .owner(&to, IndexFilter::Error);
                }
                if record.is_contract_creation {
                    fanout = fanout
                        .owner(&from, IndexFilter::Contract)
                        .owner(&to, IndexFilter::Contract);
                }

                let key = keys::transaction_key(&self.chain, tx.hash);
                emit_canonical(&mut out.data, &key, &record, fanout.keys())?;

                out.mark_balance(cache, &from, &keys::NATIVE_TOKEN);
                out.mark_balance(cache, &to, &keys::NATIVE_TOKEN);
            }
            Ok(())
        })
    }
}

fn index_transaction(block: &RawBlock, tx: &RawTransaction) -> TransactionIndexed {
    let created = tx.created_contract();
    let to = created.or(tx.to).unwrap_or(Address::ZERO);
    let method_id = if tx.data.len() > 3 {
        Bytes::copy_from_slice(&tx.data[..4])
    } else {
        Bytes::new()
    };

    TransactionIndexed {
        hash: tx.hash,
        block_number: block.number,
        time: block.time,
        method_id,
        from: tx.from,
        to,
        value: tx.value,
        tx_fee: tx.gas_price.saturating_mul(U256::from(tx.gas_used)),
        gas_price: tx.gas_price,
        is_contract_creation: created.is_some(),
        invokes_contract: !tx.itx.is_empty()
            || tx.gas_used > TRANSFER_GAS
            || !tx.error_msg.is_empty(),
        error_msg: tx.error_msg.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::chains::evm::decoder::SolTransferDecoder;
    use std::sync::Arc;

    fn transformer() -> EvmTransformer {
        EvmTransformer::new("1", Arc::new(SolTransferDecoder::new()))
    }

    #[test]
    fn plain_transfer_does_not_invoke_contract() {
        let raw = block(10, vec![transfer(0x10, ALICE, BOB, 5)]);
        let record = index_transaction(&raw, &raw.transactions[0]);

        assert!(!record.invokes_contract);
        assert!(!record.is_contract_creation);
        assert!(record.method_id.is_empty());
        assert_eq!(record.to, BOB);
        assert_eq!(record.tx_fee, U256::from(210_000u64));
    }

    #[test]
    fn zero_contract_address_is_not_a_creation() {
        let raw = block(10, Vec::new());
        let mut tx = transfer(0x10, ALICE, BOB, 5);
        tx.contract_address = Some(Address::ZERO);

        let record = index_transaction(&raw, &tx);
        assert!(!record.is_contract_creation);
        assert_eq!(record.to, BOB);
    }

    #[test]
    fn failed_call_gets_error_rows_and_method_rows() {
        let mut tx = transfer(0x10, ALICE, BOB, 0);
        tx.data = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02]);
        tx.error_msg = "execution reverted".to_string();
        let raw = block(10, vec![tx]);
        let cache = BalanceUpdateCache::default();

        let out = transformer().transform_tx(&raw, &cache).unwrap();
        let key = keys::transaction_key("1", raw.transactions[0].hash);
        let rows = pointers(&out.data, &key);

        let (a, b) = ("a1".repeat(20), "b0".repeat(20));
        let ts = reverse_timestamp_key(&raw.time).unwrap();
        assert!(rows.contains(&format!("1:I:TX:{a}:TO:{b}:{ts}:9999").as_str()));
        assert!(rows.contains(&format!("1:I:TX:{b}:FROM:{a}:{ts}:9999").as_str()));
        assert!(rows.contains(&format!("1:I:TX:{a}:BLOCK:999999990:9999").as_str()));
        assert!(rows.contains(&format!("1:I:TX:{b}:METHOD:deadbeef:{ts}:9999").as_str()));
        assert!(rows.contains(&format!("1:I:TX:{a}:ERROR:{ts}:9999").as_str()));
        assert!(rows.contains(&format!("1:I:TX:{b}:ERROR:{ts}:9999").as_str()));
        assert!(!rows.iter().any(|k| k.contains(":CONTRACT:")));
        assert_eq!(rows.len(), 10);

        let indexed: TransactionIndexed = record(&out.data, &key);
        assert!(indexed.invokes_contract);
        assert_eq!(indexed.method_id, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(out.metadata_updates.len(), 2);
    }
}
