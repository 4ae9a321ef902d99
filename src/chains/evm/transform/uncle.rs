use super::builder::{IndexFanout, emit_canonical};
use super::{EvmTransformer, TransformOutput, validate_block};
use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::chains::evm::reward::uncle_reward;
use crate::core::error::Result;
use crate::core::table::UncleIndexed;
use crate::core::types::RawBlock;
use crate::storage::encoding::{MAX_UNCLES, reverse_index_key, reverse_timestamp_key};
use crate::storage::schema::{IndexFilter, IndexKind, keys};

impl EvmTransformer {
    /// Uncles under `<chain>:U:<revBlock>:<revUncle>`, indexed by uncle miner
    /// against the including block's time.
    pub fn transform_uncle(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        validate_block(block)?;
        let time_key = reverse_timestamp_key(&block.time)?;

        self.emit(cache, |out| {
            for (i, uncle) in block.uncles.iter().enumerate() {
                let record = UncleIndexed {
                    number: uncle.number,
                    block_number: block.number,
                    gas_limit: uncle.gas_limit,
                    gas_used: uncle.gas_used,
                    base_fee: uncle.base_fee,
                    difficulty: uncle.difficulty,
                    time: uncle.time,
                    reward: uncle_reward(uncle.number, block.number),
                };
                let key = keys::uncle_key(&self.chain, block.number, i)?;
                let suffix = [time_key.clone(), reverse_index_key(i, MAX_UNCLES)?];
                let index_keys = IndexFanout::new(&self.chain, IndexKind::Uncle, &suffix)
                    .owner(&uncle.coinbase, IndexFilter::Time)
                    .keys();
                emit_canonical(&mut out.data, &key, &record, index_keys)?;

                out.mark_balance(cache, &uncle.coinbase, &keys::NATIVE_TOKEN);
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
    use crate::core::types::RawUncle;
    use alloy::primitives::{Address, B256, U256};
    use std::sync::Arc;

    #[test]
    fn uncle_rows_carry_distance_reward() {
        let mut raw = block(200, Vec::new());
        let miner = Address::new([0x55; 20]);
        raw.uncles = vec![RawUncle {
            hash: B256::repeat_byte(0x44),
            number: 198,
            coinbase: miner,
            difficulty: U256::from(9u64),
            gas_limit: 1,
            gas_used: 1,
            base_fee: U256::ZERO,
            time: raw.time,
        }];
        let cache = BalanceUpdateCache::default();
        let transformer = EvmTransformer::new("1", Arc::new(SolTransferDecoder::new()));

        let out = transformer.transform_uncle(&raw, &cache).unwrap();

        let key = keys::uncle_key("1", 200, 0).unwrap();
        assert_eq!(key, "1:U:999999800:99");
        let indexed: UncleIndexed = record(&out.data, &key);
        assert_eq!(indexed.reward, uncle_reward(198, 200));
        assert_eq!(indexed.block_number, 200);

        let ts = reverse_timestamp_key(&raw.time).unwrap();
        assert_eq!(
            pointers(&out.data, &key),
            vec![format!("1:I:U:{}:TIME:{ts}:99", "55".repeat(20))]
        );
        assert_eq!(
            out.metadata_updates.keys,
            vec![keys::balance_update_key(miner, keys::NATIVE_TOKEN)]
        );
    }
}
