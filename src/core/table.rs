use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical block row stored under `<chain>:B:<revBlock>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockIndexed {
    pub hash: B256,
    pub parent_hash: B256,
    pub uncle_hash: B256,
    pub coinbase: Address,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: DateTime<Utc>,
    pub base_fee: U256,
    pub uncle_count: u64,
    pub transaction_count: u64,
    /// Sum of the rewards of every uncle included in this block.
    pub uncle_reward: U256,
    /// Sum of `gas_used * gas_price` over the block's transactions.
    pub tx_reward: U256,
    /// Zero when the block has no transactions.
    pub lowest_gas_price: U256,
    pub highest_gas_price: U256,
    /// Value paid to the miner through internal calls.
    pub mev: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionIndexed {
    pub hash: B256,
    pub block_number: u64,
    pub time: DateTime<Utc>,
    /// First four bytes of the call data, empty for bare transfers.
    pub method_id: Bytes,
    pub from: Address,
    /// Created contract for deployments, otherwise the stated recipient.
    pub to: Address,
    pub value: U256,
    pub tx_fee: U256,
    pub gas_price: U256,
    pub is_contract_creation: bool,
    pub invokes_contract: bool,
    pub error_msg: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InternalTransactionIndexed {
    pub parent_hash: B256,
    pub block_number: u64,
    pub time: DateTime<Utc>,
    pub call_type: String,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Erc20Indexed {
    pub parent_hash: B256,
    pub block_number: u64,
    pub time: DateTime<Utc>,
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Erc721Indexed {
    pub parent_hash: B256,
    pub block_number: u64,
    pub time: DateTime<Utc>,
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Erc1155Indexed {
    pub parent_hash: B256,
    pub block_number: u64,
    pub time: DateTime<Utc>,
    pub token_address: Address,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
    pub value: U256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UncleIndexed {
    pub number: u64,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee: U256,
    pub difficulty: U256,
    pub time: DateTime<Utc>,
    pub reward: U256,
}
