use super::builder::{IndexFanout, emit_canonical};
use super::{EvmTransformer, TransformOutput, validate_block};
use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::core::error::Result;
use crate::core::table::InternalTransactionIndexed;
use crate::core::types::RawBlock;
use crate::storage::encoding::{
    MAX_INTERNAL_TRANSACTIONS, MAX_TRANSACTIONS, reverse_index_key, reverse_timestamp_key,
};
use crate::storage::schema::{IndexKind, keys};

impl EvmTransformer {
    /// Value-carrying internal calls, keyed `<chain>:ITX:<txHash>:<revItx>`.
    /// The top-level frame duplicates the transaction itself and is skipped.
    pub fn transform_itx(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        validate_block(block)?;
        let time_key = reverse_timestamp_key(&block.time)?;

        self.emit(cache, |out| {
            for (i, tx) in block.transactions.iter().enumerate() {
                let tx_index = reverse_index_key(i, MAX_TRANSACTIONS)?;
                for (j, itx) in tx.itx.iter().enumerate() {
                    if itx.is_top_level() || itx.value.is_zero() {
                        continue;
                    }

                    let record = InternalTransactionIndexed {
                        parent_hash: tx.hash,
                        block_number: block.number,
                        time: block.time,
                        call_type: itx.call_type.clone(),
                        from: itx.from,
                        to: itx.to,
                        value: itx.value,
                    };
                    let key = keys::internal_transaction_key(&self.chain, tx.hash, j)?;
                    let suffix = [
                        time_key.clone(),
                        tx_index.clone(),
                        reverse_index_key(j, MAX_INTERNAL_TRANSACTIONS)?,
                    ];
                    let index_keys =
                        IndexFanout::new(&self.chain, IndexKind::InternalTransaction, &suffix)
                            .parties(&itx.from, &itx.to)
                            .keys();
                    emit_canonical(&mut out.data, &key, &record, index_keys)?;

                    out.mark_balance(cache, &itx.to, &keys::NATIVE_TOKEN);
                    out.mark_balance(cache, &itx.from, &keys::NATIVE_TOKEN);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::chains::evm::decoder::SolTransferDecoder;
    use std::sync::Arc;

    #[test]
    fn skips_top_level_and_zero_value_frames() {
        let mut tx = transfer(0x10, ALICE, BOB, 0);
        tx.itx = vec![
            call("[]", ALICE, BOB, 9),
            call("[0]", BOB, MINER, 0),
            call("[1]", BOB, CREATED, 3),
        ];
        let raw = block(50, vec![tx]);
        let cache = BalanceUpdateCache::default();
        let transformer = EvmTransformer::new("1", Arc::new(SolTransferDecoder::new()));

        let out = transformer.transform_itx(&raw, &cache).unwrap();

        let key = keys::internal_transaction_key("1", raw.transactions[0].hash, 2).unwrap();
        assert!(key.ends_with(":999997"));
        let indexed: InternalTransactionIndexed = record(&out.data, &key);
        assert_eq!(indexed.to, CREATED);
        assert_eq!(indexed.call_type, "call");

        // One canonical row plus four views.
        assert_eq!(out.data.len(), 5);
        let ts = reverse_timestamp_key(&raw.time).unwrap();
        let (b, c) = ("b0".repeat(20), "cc".repeat(20));
        assert!(
            pointers(&out.data, &key)
                .contains(&format!("1:I:ITX:{b}:TO:{c}:{ts}:9999:999997").as_str())
        );
        assert_eq!(out.metadata_updates.len(), 2);
    }
}
