use alloy::primitives::LogData;
use alloy::sol_types::SolEvent;
use tracing::debug;

use crate::core::decoder::{Erc20Transfer, Erc721Transfer, Erc1155Transfer, TransferLogDecoder};
use crate::core::types::RawLog;

mod erc20 {
    alloy::sol! {
        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

mod erc721 {
    alloy::sol! {
        #[derive(Debug)]
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

mod erc1155 {
    alloy::sol! {
        #[derive(Debug)]
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        #[derive(Debug)]
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
    }
}

/// Decodes the standard token transfer events with `sol!` bindings.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolTransferDecoder;

impl SolTransferDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Receipt logs are decoded whatever their `removed` flag says.
    fn decode<E: SolEvent>(log: &RawLog, topic_count: usize) -> Option<E> {
        if log.topics.len() != topic_count || log.topics[0] != E::SIGNATURE_HASH {
            return None;
        }
        let data = LogData::new_unchecked(log.topics.clone(), log.data.clone());
        match E::decode_log_data(&data, true) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(address = %log.address, "Skipping undecodable {} log: {}", E::SIGNATURE, e);
                None
            }
        }
    }
}

impl TransferLogDecoder for SolTransferDecoder {
    fn decode_erc20(&self, log: &RawLog) -> Option<Erc20Transfer> {
        Self::decode::<erc20::Transfer>(log, 3).map(|event| Erc20Transfer {
            from: event.from,
            to: event.to,
            value: event.value,
        })
    }

    fn decode_erc721(&self, log: &RawLog) -> Option<Erc721Transfer> {
        Self::decode::<erc721::Transfer>(log, 4).map(|event| Erc721Transfer {
            from: event.from,
            to: event.to,
            token_id: event.tokenId,
        })
    }

    fn decode_erc1155(&self, log: &RawLog) -> Option<Erc1155Transfer> {
        if let Some(event) = Self::decode::<erc1155::TransferSingle>(log, 4) {
            return Some(Erc1155Transfer {
                operator: event.operator,
                from: event.from,
                to: event.to,
                ids: vec![event.id],
                values: vec![event.value],
                is_batch: false,
            });
        }
        Self::decode::<erc1155::TransferBatch>(log, 4).map(|event| Erc1155Transfer {
            operator: event.operator,
            from: event.from,
            to: event.to,
            ids: event.ids,
            values: event.values,
            is_batch: true,
        })
    }
}

/// Log builders shared by the transform tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use alloy::primitives::{Address, B256, U256};

    fn topic(address: Address) -> B256 {
        address.into_word()
    }

    pub fn erc20_transfer(token: Address, from: Address, to: Address, value: U256) -> RawLog {
        let event = erc20::Transfer { from, to, value };
        RawLog {
            address: token,
            topics: vec![erc20::Transfer::SIGNATURE_HASH, topic(from), topic(to)],
            data: event.encode_data().into(),
            removed: false,
        }
    }

    pub fn erc721_transfer(token: Address, from: Address, to: Address, id: U256) -> RawLog {
        RawLog {
            address: token,
            topics: vec![
                erc721::Transfer::SIGNATURE_HASH,
                topic(from),
                topic(to),
                B256::from(id.to_be_bytes::<32>()),
            ],
            data: Default::default(),
            removed: false,
        }
    }

    pub fn erc1155_batch(
        token: Address,
        operator: Address,
        from: Address,
        to: Address,
        ids: Vec<U256>,
        values: Vec<U256>,
    ) -> RawLog {
        let event = erc1155::TransferBatch {
            operator,
            from,
            to,
            ids,
            values,
        };
        RawLog {
            address: token,
            topics: vec![
                erc1155::TransferBatch::SIGNATURE_HASH,
                topic(operator),
                topic(from),
                topic(to),
            ],
            data: event.encode_data().into(),
            removed: false,
        }
    }

    pub fn erc1155_single(
        token: Address,
        operator: Address,
        from: Address,
        to: Address,
        id: U256,
        value: U256,
    ) -> RawLog {
        let event = erc1155::TransferSingle {
            operator,
            from,
            to,
            id,
            value,
        };
        RawLog {
            address: token,
            topics: vec![
                erc1155::TransferSingle::SIGNATURE_HASH,
                topic(operator),
                topic(from),
                topic(to),
            ],
            data: event.encode_data().into(),
            removed: false,
        }
    }
}
