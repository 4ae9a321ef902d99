use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Abstraction over indexer runtime metrics, allowing a no-op implementation when disabled.
pub trait IndexerMetrics: Send + Sync {
    fn record_block_indexed(&self, block_number: u64, duration: Duration, rows: usize);
    fn record_bulk_write(&self, table: &str, duration: Duration, rows: usize, batches: usize);
    fn record_bulk_write_failure(&self, table: &str);
    fn record_gap_detected(&self, upper: u64, lower: u64);
    fn record_balance_marks(&self, emitted: usize, suppressed: usize);
}

#[derive(Default)]
pub struct NoopIndexerMetrics;

impl NoopIndexerMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl IndexerMetrics for NoopIndexerMetrics {
    fn record_block_indexed(&self, _block_number: u64, _duration: Duration, _rows: usize) {}

    fn record_bulk_write(&self, _table: &str, _duration: Duration, _rows: usize, _batches: usize) {
    }

    fn record_bulk_write_failure(&self, _table: &str) {}

    fn record_gap_detected(&self, _upper: u64, _lower: u64) {}

    fn record_balance_marks(&self, _emitted: usize, _suppressed: usize) {}
}

/// Starts the Prometheus scrape endpoint on `0.0.0.0:<port>`. Must run inside
/// the tokio runtime.
pub fn install_prometheus_exporter(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
    info!("📊 Metrics exporter listening on http://{}/metrics", addr);
    Ok(())
}

pub struct PrometheusIndexerMetrics {
    chain: String,
}

impl PrometheusIndexerMetrics {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }
}

impl IndexerMetrics for PrometheusIndexerMetrics {
    fn record_block_indexed(&self, block_number: u64, duration: Duration, rows: usize) {
        let chain = self.chain.clone();
        metrics::counter!(
            "indexer_blocks_indexed_total",
            1,
            "chain" => chain.clone()
        );
        metrics::histogram!(
            "indexer_block_transform_seconds",
            duration.as_secs_f64(),
            "chain" => chain.clone()
        );
        metrics::counter!(
            "indexer_rows_emitted_total",
            rows as u64,
            "chain" => chain.clone()
        );
        metrics::gauge!(
            "indexer_last_indexed_block",
            block_number as f64,
            "chain" => chain
        );
    }

    fn record_bulk_write(&self, table: &str, duration: Duration, rows: usize, batches: usize) {
        let chain = self.chain.clone();
        let table = table.to_string();
        metrics::histogram!(
            "indexer_bulk_write_seconds",
            duration.as_secs_f64(),
            "chain" => chain.clone(),
            "table" => table.clone()
        );
        metrics::counter!(
            "indexer_bulk_write_batches_total",
            batches as u64,
            "chain" => chain.clone(),
            "table" => table.clone()
        );
        metrics::counter!(
            "indexer_bulk_write_rows_total",
            rows as u64,
            "chain" => chain,
            "table" => table
        );
    }

    fn record_bulk_write_failure(&self, table: &str) {
        let chain = self.chain.clone();
        let table = table.to_string();
        metrics::counter!(
            "indexer_bulk_write_failures_total",
            1,
            "chain" => chain,
            "table" => table
        );
    }

    fn record_gap_detected(&self, upper: u64, lower: u64) {
        let chain = self.chain.clone();
        metrics::counter!(
            "indexer_gaps_detected_total",
            1,
            "chain" => chain.clone()
        );
        metrics::gauge!(
            "indexer_gap_missing_blocks",
            upper.saturating_sub(lower).saturating_sub(1) as f64,
            "chain" => chain
        );
    }

    fn record_balance_marks(&self, emitted: usize, suppressed: usize) {
        let chain = self.chain.clone();
        if emitted > 0 {
            metrics::counter!(
                "indexer_balance_marks_emitted_total",
                emitted as u64,
                "chain" => chain.clone()
            );
        }
        if suppressed > 0 {
            metrics::counter!(
                "indexer_balance_marks_suppressed_total",
                suppressed as u64,
                "chain" => chain
            );
        }
    }
}
