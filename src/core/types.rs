use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw block snapshot as written into the blocks table by an exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub hash: B256,
    pub parent_hash: B256,
    pub uncle_hash: B256,
    pub coinbase: Address,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub base_fee: U256,
    #[serde(default)]
    pub uncles: Vec<RawUncle>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawUncle {
    pub hash: B256,
    pub number: u64,
    pub coinbase: Address,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    #[serde(default)]
    pub base_fee: U256,
    pub time: DateTime<Utc>,
}

/// Transaction merged with its receipt and execution trace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    pub gas_price: U256,
    pub gas_used: u64,
    /// Address of the created contract, taken from the receipt.
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// Empty when execution succeeded.
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub logs: Vec<RawLog>,
    #[serde(default)]
    pub itx: Vec<RawInternalTx>,
}

impl RawTransaction {
    /// Receipt contract address, ignoring the zero address some nodes report
    /// for plain calls.
    pub fn created_contract(&self) -> Option<Address> {
        self.contract_address.filter(|addr| !addr.is_zero())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub removed: bool,
}

/// One call frame of a traced transaction. The top-level frame has path `[]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawInternalTx {
    pub call_type: String,
    pub path: String,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl RawInternalTx {
    pub const TOP_LEVEL_PATH: &'static str = "[]";

    pub fn is_top_level(&self) -> bool {
        self.path == Self::TOP_LEVEL_PATH
    }
}
