use std::fmt;
use std::str::FromStr;

use alloy::hex;

use crate::core::error::{IndexerError, Result};

/// Column holding serialized records on canonical rows and snapshots.
pub const DATA_COLUMN: &str = "data";

/// Entity kinds that own a family of index rows (`<chain>:I:<KIND>:...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Block,
    Uncle,
    Transaction,
    InternalTransaction,
    Erc20,
    Erc721,
    Erc1155,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Block => "B",
            IndexKind::Uncle => "U",
            IndexKind::Transaction => "TX",
            IndexKind::InternalTransaction => "ITX",
            IndexKind::Erc20 => "ERC20",
            IndexKind::Erc721 => "ERC721",
            IndexKind::Erc1155 => "ERC1155",
        }
    }

    /// Segments kept from a continuation token when computing the end of a
    /// page scan.
    pub fn prefix_segments(&self) -> usize {
        match self {
            IndexKind::Block | IndexKind::Uncle => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "B" | "BLOCK" => Ok(IndexKind::Block),
            "U" | "UNCLE" => Ok(IndexKind::Uncle),
            "TX" => Ok(IndexKind::Transaction),
            "ITX" => Ok(IndexKind::InternalTransaction),
            "ERC20" => Ok(IndexKind::Erc20),
            "ERC721" => Ok(IndexKind::Erc721),
            "ERC1155" => Ok(IndexKind::Erc1155),
            other => Err(IndexerError::MalformedInput(format!(
                "unknown index kind {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFilter {
    Time,
    To,
    From,
    TokenSent,
    TokenReceived,
    Method,
    Contract,
    Error,
    Block,
}

impl IndexFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexFilter::Time => "TIME",
            IndexFilter::To => "TO",
            IndexFilter::From => "FROM",
            IndexFilter::TokenSent => "TOKEN_SENT",
            IndexFilter::TokenReceived => "TOKEN_RECEIVED",
            IndexFilter::Method => "METHOD",
            IndexFilter::Contract => "CONTRACT",
            IndexFilter::Error => "ERROR",
            IndexFilter::Block => "BLOCK",
        }
    }
}

impl fmt::Display for IndexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexFilter {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TIME" => Ok(IndexFilter::Time),
            "TO" => Ok(IndexFilter::To),
            "FROM" => Ok(IndexFilter::From),
            "TOKEN_SENT" => Ok(IndexFilter::TokenSent),
            "TOKEN_RECEIVED" => Ok(IndexFilter::TokenReceived),
            "METHOD" => Ok(IndexFilter::Method),
            "CONTRACT" => Ok(IndexFilter::Contract),
            "ERROR" => Ok(IndexFilter::Error),
            "BLOCK" => Ok(IndexFilter::Block),
            other => Err(IndexerError::MalformedInput(format!(
                "unknown index filter {other}"
            ))),
        }
    }
}

/// Builder for `<chain>:I:<KIND>:<address>[:<FILTER>[:<peer>]]:<suffix...>`.
#[derive(Debug, Clone)]
pub struct IndexKey {
    key: String,
}

impl IndexKey {
    pub fn new(chain: &str, kind: IndexKind, address: impl AsRef<[u8]>) -> Self {
        Self {
            key: format!("{chain}:I:{kind}:{}", hex::encode(address)),
        }
    }

    pub fn filter(self, filter: IndexFilter) -> Self {
        self.part(filter.as_str())
    }

    pub fn peer(self, address: impl AsRef<[u8]>) -> Self {
        self.part(hex::encode(address))
    }

    pub fn part(mut self, part: impl AsRef<str>) -> Self {
        self.key.push(':');
        self.key.push_str(part.as_ref());
        self
    }

    pub fn parts<I, S>(self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        parts.into_iter().fold(self, |key, part| key.part(part))
    }

    pub fn build(self) -> String {
        self.key
    }
}

/// Lowercase hex without `0x`, the form addresses take inside keys.
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .to_ascii_lowercase()
}

// Key naming conventions
pub mod keys {
    use alloy::hex;

    use crate::core::error::Result;
    use crate::storage::encoding::{
        MAX_INTERNAL_TRANSACTIONS, MAX_LOGS, MAX_UNCLES, reverse_block_key, reverse_index_key,
    };
    use crate::storage::schema::{IndexFilter, IndexKind};

    /// Token marker used in balance-update keys for the native currency.
    pub const NATIVE_TOKEN: [u8; 1] = [0x00];

    // example: 1:B:981462999
    pub fn block_key(chain: &str, number: u64) -> Result<String> {
        Ok(format!("{chain}:B:{}", reverse_block_key(number)?))
    }

    pub fn blocks_prefix(chain: &str) -> String {
        format!("{chain}:B:")
    }

    // example: 1:981462999 (blocks table)
    pub fn raw_block_key(chain: &str, number: u64) -> Result<String> {
        Ok(format!("{chain}:{}", reverse_block_key(number)?))
    }

    pub fn raw_blocks_prefix(chain: &str) -> String {
        format!("{chain}:")
    }

    pub fn transaction_key(chain: &str, hash: impl AsRef<[u8]>) -> String {
        format!("{chain}:TX:{}", hex::encode(hash))
    }

    pub fn internal_transaction_key(
        chain: &str,
        parent_hash: impl AsRef<[u8]>,
        index: usize,
    ) -> Result<String> {
        Ok(format!(
            "{chain}:ITX:{}:{}",
            hex::encode(parent_hash),
            reverse_index_key(index, MAX_INTERNAL_TRANSACTIONS)?
        ))
    }

    // example: 1:ERC20:<tx hash>:99998
    pub fn transfer_key(
        chain: &str,
        kind: IndexKind,
        parent_hash: impl AsRef<[u8]>,
        log_index: usize,
    ) -> Result<String> {
        Ok(format!(
            "{chain}:{kind}:{}:{}",
            hex::encode(parent_hash),
            reverse_index_key(log_index, MAX_LOGS)?
        ))
    }

    pub fn uncle_key(chain: &str, block_number: u64, uncle_index: usize) -> Result<String> {
        Ok(format!(
            "{chain}:U:{}:{}",
            reverse_block_key(block_number)?,
            reverse_index_key(uncle_index, MAX_UNCLES)?
        ))
    }

    /// First-page token for an address view, e.g. `1:I:TX:<address>:TIME:`.
    pub fn index_page_prefix(
        chain: &str,
        kind: IndexKind,
        address: &str,
        filter: IndexFilter,
    ) -> String {
        format!("{chain}:I:{kind}:{address}:{filter}:")
    }

    pub fn index_count_prefix(
        chain: &str,
        kind: IndexKind,
        address: &str,
        filter: IndexFilter,
    ) -> String {
        format!("{chain}:I:{kind}:{address}:{filter}")
    }

    // example: B:<address>:00
    pub fn balance_update_key(address: impl AsRef<[u8]>, token: impl AsRef<[u8]>) -> String {
        format!("B:{}:{}", hex::encode(address), hex::encode(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    #[test]
    fn canonical_keys_follow_grammar() {
        let hash = B256::repeat_byte(0xab);
        assert_eq!(keys::block_key("1", 1).unwrap(), "1:B:999999999");
        assert_eq!(keys::raw_block_key("1", 10).unwrap(), "1:999999990");
        assert_eq!(keys::transaction_key("1", hash), format!("1:TX:{}", "ab".repeat(32)));
        assert_eq!(
            keys::internal_transaction_key("1", hash, 2).unwrap(),
            format!("1:ITX:{}:999997", "ab".repeat(32))
        );
        assert_eq!(
            keys::transfer_key("1", IndexKind::Erc1155, hash, 0).unwrap(),
            format!("1:ERC1155:{}:99999", "ab".repeat(32))
        );
        assert_eq!(keys::uncle_key("1", 5, 1).unwrap(), "1:U:999999995:98");
    }

    #[test]
    fn index_key_builder() {
        let from = Address::repeat_byte(0x11);
        let to = Address::repeat_byte(0x22);
        let key = IndexKey::new("1", IndexKind::Transaction, from)
            .filter(IndexFilter::To)
            .peer(to)
            .parts(["ts", "idx"])
            .build();
        assert_eq!(
            key,
            format!("1:I:TX:{}:TO:{}:ts:idx", "11".repeat(20), "22".repeat(20))
        );
    }

    #[test]
    fn balance_update_key_uses_native_marker() {
        let addr = Address::repeat_byte(0x01);
        assert_eq!(
            keys::balance_update_key(addr, keys::NATIVE_TOKEN),
            format!("B:{}:00", "01".repeat(20))
        );
    }

    #[test]
    fn parses_kinds_and_filters() {
        assert_eq!("erc20".parse::<IndexKind>().unwrap(), IndexKind::Erc20);
        assert_eq!("B".parse::<IndexKind>().unwrap().prefix_segments(), 4);
        assert_eq!(
            "token_sent".parse::<IndexFilter>().unwrap(),
            IndexFilter::TokenSent
        );
        assert!("nope".parse::<IndexFilter>().is_err());
        assert_eq!(normalize_address("0xABcd"), "abcd");
    }
}
