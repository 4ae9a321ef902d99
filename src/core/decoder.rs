use alloy::primitives::{Address, U256};

use crate::core::types::RawLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20Transfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc721Transfer {
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
}

/// `TransferSingle` and `TransferBatch` both decode into this shape; a single
/// transfer carries one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc1155Transfer {
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub ids: Vec<U256>,
    pub values: Vec<U256>,
    pub is_batch: bool,
}

/// ABI filter over receipt logs. Every method returns `None` for a log that is
/// not the expected transfer event.
pub trait TransferLogDecoder: Send + Sync {
    fn decode_erc20(&self, log: &RawLog) -> Option<Erc20Transfer>;
    fn decode_erc721(&self, log: &RawLog) -> Option<Erc721Transfer>;
    fn decode_erc1155(&self, log: &RawLog) -> Option<Erc1155Transfer>;
}
