use alloy::primitives::U256;

use super::builder::{IndexFanout, emit_canonical};
use super::{EvmTransformer, TransformOutput, validate_block};
use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::chains::evm::reward::uncle_reward;
use crate::core::error::Result;
use crate::core::table::BlockIndexed;
use crate::core::types::RawBlock;
use crate::storage::encoding::reverse_timestamp_key;
use crate::storage::schema::{IndexFilter, IndexKind, keys};

impl EvmTransformer {
    /// Canonical block row under `<chain>:B:<revBlock>` with the reward
    /// aggregates, indexed by miner as `<chain>:I:B:<miner>:TIME:<revTime>`.
    pub fn transform_block(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        validate_block(block)?;
        let key = keys::block_key(&self.chain, block.number)?;
        let suffix = [reverse_timestamp_key(&block.time)?];

        self.emit(cache, |out| {
            let record = index_block(block);
            let index_keys = IndexFanout::new(&self.chain, IndexKind::Block, &suffix)
                .owner(&block.coinbase, IndexFilter::Time)
                .keys();
            emit_canonical(&mut out.data, &key, &record, index_keys)?;
            out.mark_balance(cache, &block.coinbase, &keys::NATIVE_TOKEN);
            Ok(())
        })
    }
}

fn index_block(block: &RawBlock) -> BlockIndexed {
    let uncle_reward = block
        .uncles
        .iter()
        .fold(U256::ZERO, |acc, uncle| {
            acc.saturating_add(uncle_reward(uncle.number, block.number))
        });

    let tx_reward = block.transactions.iter().fold(U256::ZERO, |acc, tx| {
        acc.saturating_add(tx.gas_price.saturating_mul(U256::from(tx.gas_used)))
    });

    let gas_prices = block.transactions.iter().map(|tx| tx.gas_price);
    let lowest_gas_price = gas_prices.clone().min().unwrap_or_default();
    let highest_gas_price = gas_prices.max().unwrap_or_default();

    BlockIndexed {
        hash: block.hash,
        parent_hash: block.parent_hash,
        uncle_hash: block.uncle_hash,
        coinbase: block.coinbase,
        difficulty: block.difficulty,
        number: block.number,
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        time: block.time,
        base_fee: block.base_fee,
        uncle_count: block.uncles.len() as u64,
        transaction_count: block.transactions.len() as u64,
        uncle_reward,
        tx_reward,
        lowest_gas_price,
        highest_gas_price,
        mev: miner_payments(block),
    }
}

/// Value moved to the block's miner by internal calls.
fn miner_payments(block: &RawBlock) -> U256 {
    block
        .transactions
        .iter()
        .flat_map(|tx| &tx.itx)
        .filter(|itx| itx.to == block.coinbase)
        .fold(U256::ZERO, |acc, itx| acc.saturating_add(itx.value))
}
