use alloy::primitives::{Address, B256};
use tracing::warn;

use super::builder::{IndexFanout, emit_canonical};
use super::{EvmTransformer, TransformOutput, validate_block};
use crate::chains::evm::balance_cache::BalanceUpdateCache;
use crate::core::error::{IndexerError, Result};
use crate::core::table::{Erc20Indexed, Erc721Indexed, Erc1155Indexed};
use crate::core::types::{RawBlock, RawLog};
use crate::storage::encoding::{
    MAX_BATCH_ENTRIES, MAX_LOGS, MAX_TRANSACTIONS, reverse_index_key, reverse_timestamp_key,
};
use crate::storage::schema::{IndexKind, keys};

/// Position of one log inside its block, with the ordering suffix shared by
/// every index row derived from it.
struct LogSite<'b> {
    tx_hash: B256,
    log_index: usize,
    log: &'b RawLog,
    suffix: Vec<String>,
}

impl EvmTransformer {
    /// ERC20 `Transfer` logs under `<chain>:ERC20:<txHash>:<revLog>`.
    pub fn transform_erc20(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        self.transform_logs(block, cache, |out, site| {
            let Some(transfer) = self.decoder.decode_erc20(site.log) else {
                return Ok(());
            };
            let record = Erc20Indexed {
                parent_hash: site.tx_hash,
                block_number: block.number,
                time: block.time,
                token_address: site.log.address,
                from: transfer.from,
                to: transfer.to,
                value: transfer.value,
            };
            let key = keys::transfer_key(&self.chain, IndexKind::Erc20, site.tx_hash, site.log_index)?;
            self.emit_transfer(out, cache, IndexKind::Erc20, &key, &record, &site.suffix, (
                &record.token_address,
                &record.from,
                &record.to,
            ))
        })
    }

    /// ERC721 `Transfer` logs (token id as the fourth topic).
    pub fn transform_erc721(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        self.transform_logs(block, cache, |out, site| {
            let Some(transfer) = self.decoder.decode_erc721(site.log) else {
                return Ok(());
            };
            let record = Erc721Indexed {
                parent_hash: site.tx_hash,
                block_number: block.number,
                time: block.time,
                token_address: site.log.address,
                from: transfer.from,
                to: transfer.to,
                token_id: transfer.token_id,
            };
            let key =
                keys::transfer_key(&self.chain, IndexKind::Erc721, site.tx_hash, site.log_index)?;
            self.emit_transfer(out, cache, IndexKind::Erc721, &key, &record, &site.suffix, (
                &record.token_address,
                &record.from,
                &record.to,
            ))
        })
    }

    /// ERC1155 `TransferSingle` and `TransferBatch` logs. A batch becomes one
    /// row per (id, value) pair, each with an extra `:<revEntry>` segment.
    pub fn transform_erc1155(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
    ) -> Result<TransformOutput> {
        self.transform_logs(block, cache, |out, site| {
            let Some(transfer) = self.decoder.decode_erc1155(site.log) else {
                return Ok(());
            };
            if transfer.ids.len() != transfer.values.len() {
                warn!(
                    tx = %site.tx_hash,
                    ids = transfer.ids.len(),
                    values = transfer.values.len(),
                    "⚠️ Skipping ERC1155 batch with mismatched ids and values"
                );
                return Ok(());
            }
            if transfer.ids.len() > MAX_BATCH_ENTRIES + 1 {
                return Err(IndexerError::MalformedInput(format!(
                    "ERC1155 batch in tx {} has {} entries, at most {} allowed",
                    site.tx_hash,
                    transfer.ids.len(),
                    MAX_BATCH_ENTRIES + 1
                )));
            }

            let base_key =
                keys::transfer_key(&self.chain, IndexKind::Erc1155, site.tx_hash, site.log_index)?;
            for (k, (id, value)) in transfer.ids.iter().zip(&transfer.values).enumerate() {
                let record = Erc1155Indexed {
                    parent_hash: site.tx_hash,
                    block_number: block.number,
                    time: block.time,
                    token_address: site.log.address,
                    operator: transfer.operator,
                    from: transfer.from,
                    to: transfer.to,
                    token_id: *id,
                    value: *value,
                };
                let (key, suffix) = if transfer.is_batch {
                    let entry = reverse_index_key(k, MAX_BATCH_ENTRIES)?;
                    let mut suffix = site.suffix.clone();
                    suffix.push(entry.clone());
                    (format!("{base_key}:{entry}"), suffix)
                } else {
                    (base_key.clone(), site.suffix.clone())
                };
                self.emit_transfer(out, cache, IndexKind::Erc1155, &key, &record, &suffix, (
                    &record.token_address,
                    &record.from,
                    &record.to,
                ))?;
            }
            Ok(())
        })
    }

    /// Walks every log of every transaction, handing each to `visit` along
    /// with its position.
    fn transform_logs<F>(
        &self,
        block: &RawBlock,
        cache: &BalanceUpdateCache,
        mut visit: F,
    ) -> Result<TransformOutput>
    where
        F: FnMut(&mut TransformOutput, &LogSite<'_>) -> Result<()>,
    {
        validate_block(block)?;
        let time_key = reverse_timestamp_key(&block.time)?;

        self.emit(cache, |out| {
            for (i, tx) in block.transactions.iter().enumerate() {
                let tx_index = reverse_index_key(i, MAX_TRANSACTIONS)?;
                for (j, log) in tx.logs.iter().enumerate() {
                    let site = LogSite {
                        tx_hash: tx.hash,
                        log_index: j,
                        log,
                        suffix: vec![
                            time_key.clone(),
                            tx_index.clone(),
                            reverse_index_key(j, MAX_LOGS)?,
                        ],
                    };
                    visit(out, &site)?;
                }
            }
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_transfer<T: serde::Serialize>(
        &self,
        out: &mut TransformOutput,
        cache: &BalanceUpdateCache,
        kind: IndexKind,
        key: &str,
        record: &T,
        suffix: &[String],
        (token, from, to): (&Address, &Address, &Address),
    ) -> Result<()> {
        let index_keys = IndexFanout::new(&self.chain, kind, suffix)
            .token_parties(token, from, to)
            .keys();
        emit_canonical(&mut out.data, key, record, index_keys)?;

        out.mark_balance(cache, from, token.as_slice());
        out.mark_balance(cache, to, token.as_slice());
        Ok(())
    }
}
