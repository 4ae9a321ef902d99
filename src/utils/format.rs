use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte count with binary (1024) steps.
///
/// # Examples
/// ```
/// use rs_block_indexer::utils::format::format_size_bytes;
///
/// assert_eq!(format_size_bytes(512), "512 B");
/// assert_eq!(format_size_bytes(1536), "1.50 KB");
/// ```
pub fn format_size_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", SIZE_UNITS[unit])
    }
}

/// Throughput of `count` items over `elapsed`, e.g. `12.5/s`.
pub fn format_rate(count: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return format!("{count}/s");
    }
    format!("{:.1}/s", count as f64 / secs)
}
