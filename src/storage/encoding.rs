//! Order-reversing key encoders.
//!
//! The store only scans keys in ascending byte order, so every numeric key
//! component is written as `ceiling - value`, zero padded to a fixed width.
//! An ascending scan then walks newest blocks, latest timestamps and highest
//! ordinals first.

use chrono::{DateTime, Utc};

use crate::core::error::{IndexerError, Result};
use crate::core::storage::RowRange;

/// Ceiling for block-number keys. Valid block numbers are `1..=MAX_BLOCK_NUMBER`.
pub const MAX_BLOCK_NUMBER: u64 = 1_000_000_000;
const BLOCK_KEY_WIDTH: usize = 9;
const TIMESTAMP_KEY_WIDTH: usize = 19;

pub const MAX_TRANSACTIONS: usize = 9_999;
pub const MAX_LOGS: usize = 99_999;
pub const MAX_INTERNAL_TRANSACTIONS: usize = 999_999;
pub const MAX_UNCLES: usize = 99;
pub const MAX_BATCH_ENTRIES: usize = 9_999;

pub fn reverse_block_key(number: u64) -> Result<String> {
    if number == 0 || number > MAX_BLOCK_NUMBER {
        return Err(IndexerError::MalformedInput(format!(
            "block number {number} outside of 1..={MAX_BLOCK_NUMBER}"
        )));
    }
    Ok(format!(
        "{:0width$}",
        MAX_BLOCK_NUMBER - number,
        width = BLOCK_KEY_WIDTH
    ))
}

pub fn decode_reverse_block_key(key: &str) -> Result<u64> {
    let reversed = parse_fixed_width(key, BLOCK_KEY_WIDTH, "block")?;
    Ok(MAX_BLOCK_NUMBER - reversed)
}

pub fn reverse_timestamp_key(time: &DateTime<Utc>) -> Result<String> {
    let seconds = time.timestamp();
    if seconds < 0 {
        return Err(IndexerError::MalformedInput(format!(
            "timestamp {time} predates the unix epoch"
        )));
    }
    Ok(format!(
        "{:0width$}",
        i64::MAX - seconds,
        width = TIMESTAMP_KEY_WIDTH
    ))
}

pub fn decode_reverse_timestamp_key(key: &str) -> Result<DateTime<Utc>> {
    let reversed = parse_fixed_width(key, TIMESTAMP_KEY_WIDTH, "timestamp")?;
    let reversed = i64::try_from(reversed).map_err(|_| {
        IndexerError::MalformedInput(format!("timestamp key {key} is out of range"))
    })?;
    DateTime::from_timestamp(i64::MAX - reversed, 0).ok_or_else(|| {
        IndexerError::MalformedInput(format!("timestamp key {key} is out of range"))
    })
}

/// Encodes `max - index` padded to the digit count of `max`.
pub fn reverse_index_key(index: usize, max: usize) -> Result<String> {
    if index > max {
        return Err(IndexerError::MalformedInput(format!(
            "ordinal {index} exceeds the encodable maximum {max}"
        )));
    }
    Ok(format!("{:0width$}", max - index, width = digit_count(max)))
}

pub fn decode_reverse_index_key(key: &str, max: usize) -> Result<usize> {
    let reversed = parse_fixed_width(key, digit_count(max), "ordinal")?;
    let reversed = usize::try_from(reversed)
        .ok()
        .filter(|r| *r <= max)
        .ok_or_else(|| {
            IndexerError::MalformedInput(format!("ordinal key {key} exceeds maximum {max}"))
        })?;
    Ok(max - reversed)
}

/// Smallest byte string greater than every key starting with `prefix` once it
/// is cut to its first `segment_count` `:`-separated segments. An empty result
/// means the range is unbounded.
pub fn prefix_successor(prefix: &[u8], segment_count: usize) -> Vec<u8> {
    if prefix.is_empty() || segment_count == 0 {
        return Vec::new();
    }

    let cut = prefix
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b':')
        .nth(segment_count - 1)
        .map_or(prefix.len(), |(i, _)| i);
    let truncated = &prefix[..cut];

    match truncated.iter().rposition(|b| *b != 0xFF) {
        Some(last) => {
            let mut successor = truncated[..=last].to_vec();
            successor[last] += 1;
            successor
        }
        None => Vec::new(),
    }
}

/// Every key starting with `prefix`.
pub fn prefix_range(prefix: &str) -> RowRange {
    RowRange::new(prefix, prefix_successor(prefix.as_bytes(), usize::MAX))
}

/// Keys after `token` up to the end of its first `segment_count` segments. The
/// row equal to `token` itself is excluded.
pub fn open_range(token: &str, segment_count: usize) -> RowRange {
    let mut start = token.as_bytes().to_vec();
    start.push(0);
    RowRange::new(start, prefix_successor(token.as_bytes(), segment_count))
}

fn digit_count(n: usize) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}

fn parse_fixed_width(key: &str, width: usize, axis: &str) -> Result<u64> {
    if key.len() != width || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexerError::MalformedInput(format!(
            "{axis} key {key:?} is not a {width}-digit number"
        )));
    }
    key.parse::<u64>()
        .map_err(|e| IndexerError::MalformedInput(format!("{axis} key {key:?}: {e}")))
}
