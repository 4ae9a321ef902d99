use alloy::primitives::Address;
use serde::Serialize;

use crate::core::error::Result;
use crate::core::storage::{BulkMutations, Mutation};
use crate::storage::schema::{DATA_COLUMN, IndexFilter, IndexKey, IndexKind};

/// Appends the canonical row for `record` under `key`, then one pointer row per
/// index key. Index rows are empty and name the canonical key as their column.
pub(crate) fn emit_canonical<T, I>(
    data: &mut BulkMutations,
    key: &str,
    record: &T,
    index_keys: I,
) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = String>,
{
    let payload = serde_json::to_string(record)?;
    data.push(key, Mutation::set(DATA_COLUMN, payload));
    for index_key in index_keys {
        data.push(index_key, Mutation::set(key, ""));
    }
    Ok(())
}

/// Collects the index keys of one canonical record. Most templates end with
/// the shared ordering suffix (`<revTime>:<revTx>[:<revLog>...]`).
pub(crate) struct IndexFanout<'a> {
    chain: &'a str,
    kind: IndexKind,
    suffix: &'a [String],
    keys: Vec<String>,
}

impl<'a> IndexFanout<'a> {
    pub fn new(chain: &'a str, kind: IndexKind, suffix: &'a [String]) -> Self {
        Self {
            chain,
            kind,
            suffix,
            keys: Vec::new(),
        }
    }

    /// `<address>:<FILTER>:<suffix>`
    pub fn owner(mut self, address: &Address, filter: IndexFilter) -> Self {
        let key = IndexKey::new(self.chain, self.kind, address)
            .filter(filter)
            .parts(self.suffix)
            .build();
        self.keys.push(key);
        self
    }

    /// `<address>:<FILTER>:<peer>:<suffix>`
    pub fn peer(mut self, address: &Address, filter: IndexFilter, peer: impl AsRef<[u8]>) -> Self {
        let key = IndexKey::new(self.chain, self.kind, address)
            .filter(filter)
            .peer(peer)
            .parts(self.suffix)
            .build();
        self.keys.push(key);
        self
    }

    /// `<address>:<FILTER>:<parts>`, ignoring the shared suffix.
    pub fn custom<S: AsRef<str>>(
        mut self,
        address: &Address,
        filter: IndexFilter,
        parts: &[S],
    ) -> Self {
        let key = IndexKey::new(self.chain, self.kind, address)
            .filter(filter)
            .parts(parts)
            .build();
        self.keys.push(key);
        self
    }

    /// Sender and recipient views: `from:TO:to`, `to:FROM:from` and both `TIME` rows.
    pub fn parties(self, from: &Address, to: &Address) -> Self {
        self.peer(from, IndexFilter::To, to)
            .peer(to, IndexFilter::From, from)
            .owner(from, IndexFilter::Time)
            .owner(to, IndexFilter::Time)
    }

    /// Party views plus the token contract's timeline and the per-token
    /// sent/received views.
    pub fn token_parties(self, token: &Address, from: &Address, to: &Address) -> Self {
        self.owner(token, IndexFilter::Time)
            .parties(from, to)
            .peer(from, IndexFilter::TokenSent, token)
            .peer(to, IndexFilter::TokenReceived, token)
    }

    pub fn keys(self) -> Vec<String> {
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address::new([0xa1; 20]);
    const BOB: Address = Address::new([0xb0; 20]);
    const TOKEN: Address = Address::new([0x70; 20]);

    #[test]
    fn canonical_row_precedes_pointer_rows() {
        let mut data = BulkMutations::new();
        emit_canonical(
            &mut data,
            "1:TX:ab",
            &serde_json::json!({ "value": 1 }),
            vec!["1:I:TX:a:TIME:1".to_string(), "1:I:TX:b:TIME:1".to_string()],
        )
        .unwrap();

        assert_eq!(data.keys, vec!["1:TX:ab", "1:I:TX:a:TIME:1", "1:I:TX:b:TIME:1"]);
        assert_eq!(data.mutations[0], Mutation::set(DATA_COLUMN, r#"{"value":1}"#));
        assert_eq!(data.mutations[1], Mutation::set("1:TX:ab", ""));
    }

    #[test]
    fn token_fanout_covers_every_view() {
        let suffix = vec!["ts".to_string(), "tx".to_string(), "log".to_string()];
        let keys = IndexFanout::new("1", IndexKind::Erc20, &suffix)
            .token_parties(&TOKEN, &ALICE, &BOB)
            .keys();

        let (a, b, t) = ("a1".repeat(20), "b0".repeat(20), "70".repeat(20));
        assert_eq!(
            keys,
            vec![
                format!("1:I:ERC20:{t}:TIME:ts:tx:log"),
                format!("1:I:ERC20:{a}:TO:{b}:ts:tx:log"),
                format!("1:I:ERC20:{b}:FROM:{a}:ts:tx:log"),
                format!("1:I:ERC20:{a}:TIME:ts:tx:log"),
                format!("1:I:ERC20:{b}:TIME:ts:tx:log"),
                format!("1:I:ERC20:{a}:TOKEN_SENT:{t}:ts:tx:log"),
                format!("1:I:ERC20:{b}:TOKEN_RECEIVED:{t}:ts:tx:log"),
            ]
        );
    }
}
