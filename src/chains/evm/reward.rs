use alloy::primitives::U256;

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

pub const BYZANTIUM_BLOCK: u64 = 4_370_000;
pub const CONSTANTINOPLE_BLOCK: u64 = 7_280_000;
pub const MERGE_BLOCK: u64 = 15_537_394;

/// Static block subsidy paid to the miner of `number`.
pub fn block_reward(number: u64) -> U256 {
    let eth = match number {
        n if n < BYZANTIUM_BLOCK => 5,
        n if n < CONSTANTINOPLE_BLOCK => 3,
        n if n < MERGE_BLOCK => 2,
        _ => 0,
    };
    U256::from(eth * WEI_PER_ETH)
}

/// `(uncle + 8 - block) * R / 8`, zero once the uncle is eight or more blocks
/// behind its includer. Callers reject uncles that are not older than the
/// including block.
pub fn uncle_reward(uncle_number: u64, block_number: u64) -> U256 {
    let Some(distance) = uncle_number
        .checked_add(8)
        .and_then(|n| n.checked_sub(block_number))
    else {
        return U256::ZERO;
    };
    block_reward(block_number).saturating_mul(U256::from(distance)) / U256::from(8u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u128) -> U256 {
        U256::from(n * WEI_PER_ETH)
    }

    #[test]
    fn block_reward_follows_forks() {
        assert_eq!(block_reward(1), eth(5));
        assert_eq!(block_reward(BYZANTIUM_BLOCK - 1), eth(5));
        assert_eq!(block_reward(BYZANTIUM_BLOCK), eth(3));
        assert_eq!(block_reward(CONSTANTINOPLE_BLOCK), eth(2));
        assert_eq!(block_reward(MERGE_BLOCK - 1), eth(2));
        assert_eq!(block_reward(MERGE_BLOCK), U256::ZERO);
    }

    #[test]
    fn uncle_reward_scales_with_distance() {
        // One block behind: 7/8 of the block reward.
        assert_eq!(uncle_reward(99, 100), eth(5) * U256::from(7u64) / U256::from(8u64));
        assert_eq!(uncle_reward(94, 100), eth(5) * U256::from(2u64) / U256::from(8u64));
        assert_eq!(uncle_reward(92, 100), U256::ZERO);
        assert_eq!(uncle_reward(1, 100), U256::ZERO);
        assert_eq!(uncle_reward(MERGE_BLOCK, MERGE_BLOCK + 1), U256::ZERO);
    }

    #[test]
    fn uncle_reward_does_not_overflow() {
        assert_eq!(uncle_reward(u64::MAX, 100), U256::ZERO);
        assert_eq!(uncle_reward(u64::MAX - 7, u64::MAX), U256::ZERO);
    }
}
