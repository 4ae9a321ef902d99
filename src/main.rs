use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rs_block_indexer::{
    chains::evm::{
        checker::EvmGapChecker, cleaner::PrefixCleaner, context::EvmIndexerContext,
        decoder::SolTransferDecoder, indexer::EvmIndexer, transform::EvmTransformer,
    },
    cli::{Cli, Commands},
    config::{AppConfig, IndexerConfig},
    core::{cleaner::Cleaner, indexer::Indexer, storage::Table, types::RawBlock},
    storage::{
        manager::StorageManager,
        reader::IndexReader,
        rocksdb::RocksDBStorage,
        schema::IndexKind,
    },
    utils::{
        logger::init_logger,
        metrics::{
            IndexerMetrics, NoopIndexerMetrics, PrometheusIndexerMetrics,
            install_prometheus_exporter,
        },
    },
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const IMPORT_CHUNK: usize = 1_000;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let cfg = AppConfig::load(&args.config)?;

    init_logger(&cfg.logging)?;

    info!("✅ Configuration load successful");
    info!(chain = %cfg.indexer.chain_id, "Chain id");
    info!(storage = %cfg.storage.path, "Storage path");

    let command = args.command.unwrap_or(Commands::Run);

    let metrics: Arc<dyn IndexerMetrics> = if cfg.metrics.enable {
        install_prometheus_exporter(cfg.metrics.prometheus_exporter_port)?;
        Arc::new(PrometheusIndexerMetrics::new(cfg.indexer.chain_id.clone()))
    } else {
        Arc::new(NoopIndexerMetrics::new())
    };

    let storage = if command.is_read_only() {
        RocksDBStorage::open_read_only(&cfg.storage.path)
    } else {
        RocksDBStorage::open(&cfg.storage.path, cfg.storage.compression)
    }
    .with_context(|| format!("Failed to open storage at {}", cfg.storage.path))?;
    info!("✅ Storage opened at: {}", cfg.storage.path);

    let indexer_cfg = Arc::new(cfg.indexer.clone());
    let manager = Arc::new(StorageManager::new(
        Arc::new(storage),
        indexer_cfg.chain_id.clone(),
        metrics.clone(),
        indexer_cfg.batch_size,
        indexer_cfg.write_timeout(),
        indexer_cfg.read_timeout(),
    ));

    match command {
        Commands::Run => {
            let indexer = build_indexer(&indexer_cfg, &manager, &metrics);
            manager.log_health()?;

            let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
            spawn_signal_handlers(shutdown_tx);

            info!("🚀 Starting EVM block indexer...");
            info!("💡 Press Ctrl+C to stop gracefully");
            let result = indexer.run(shutdown_rx).await;

            manager.storage.flush()?;
            manager.log_health()?;
            if let Err(e) = result {
                error!("❌ Indexer halted: {}", e);
                return Err(e.into());
            }
            info!("✨ Indexer exited successfully");
        }
        Commands::Index { start, end } => {
            let indexer = build_indexer(&indexer_cfg, &manager, &metrics);
            indexer.index_range(start, end).await?;
            manager.storage.flush()?;
            info!("✨ Indexed blocks {} to {}", start, end);
        }
        Commands::Import { file } => {
            let imported = import_blocks(&manager, &file).await?;
            manager.storage.flush()?;
            info!("✨ Imported {} raw blocks from {}", imported, file.display());
        }
        Commands::CheckGaps { table, lookback } => {
            let checker = EvmGapChecker::new(manager.reader.clone(), metrics.clone());
            checker.check_for_gaps(table.into(), lookback).await?;
            println!("no gaps found");
        }
        Commands::LastBlock { table } => {
            let checker = EvmGapChecker::new(manager.reader.clone(), metrics.clone());
            match checker.last_block(table.into()).await? {
                Some(number) => println!("{number}"),
                None => println!("empty"),
            }
        }
        Commands::Page {
            kind,
            address,
            filter,
            token,
            limit,
        } => {
            let token =
                token.unwrap_or_else(|| manager.reader.initial_token(kind, &address, filter));
            println!("{}", page_json(&manager.reader, kind, &token, limit).await?);
        }
        Commands::Count {
            kind,
            address,
            filter,
        } => {
            let count = manager
                .reader
                .count_for_address(kind, &address, filter)
                .await?;
            println!("{count}");
        }
        Commands::DeletePrefix { prefix, table } => {
            let table: Table = table.into();
            let cleaner = PrefixCleaner::new(
                manager.reader.clone(),
                manager.writer.clone(),
                table,
                prefix.clone(),
            );
            let deleted = cleaner.cleanup().await?;
            manager.storage.flush()?;
            info!(
                table = table.as_str(),
                "🧹 Deleted {} rows under {}", deleted, prefix
            );
        }
    }

    Ok(())
}

fn build_indexer(
    cfg: &Arc<IndexerConfig>,
    manager: &Arc<StorageManager>,
    metrics: &Arc<dyn IndexerMetrics>,
) -> EvmIndexer {
    let transformer = Arc::new(EvmTransformer::new(
        cfg.chain_id.clone(),
        Arc::new(SolTransferDecoder::new()),
    ));
    let context = EvmIndexerContext::new(
        cfg.clone(),
        manager.clone(),
        transformer,
        metrics.clone(),
    );
    EvmIndexer::new(context)
}

fn spawn_signal_handlers(shutdown_tx: broadcast::Sender<()>) {
    let shutdown_tx_sigint = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        info!("📡 Received shutdown signal (Ctrl+C)");
        let _ = shutdown_tx_sigint.send(());
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                info!("📡 Received SIGTERM signal");
                let _ = shutdown_tx.send(());
            }
        });
    }
}

/// Reads newline-delimited JSON snapshots and stores them in chunks.
async fn import_blocks(manager: &StorageManager, file: &Path) -> Result<usize> {
    let body = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut chunk = Vec::with_capacity(IMPORT_CHUNK);
    let mut imported = 0;
    for (line_no, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let block: RawBlock = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid raw block", file.display(), line_no + 1))?;
        if block.number == 0 {
            warn!("⚠️ Skipping genesis block on line {}", line_no + 1);
            continue;
        }
        chunk.push(block);
        if chunk.len() == IMPORT_CHUNK {
            manager.save_blocks(&chunk).await?;
            imported += chunk.len();
            chunk.clear();
        }
    }
    manager.save_blocks(&chunk).await?;
    imported += chunk.len();
    Ok(imported)
}

async fn page_json(
    reader: &IndexReader,
    kind: IndexKind,
    token: &str,
    limit: usize,
) -> Result<String> {
    let json = match kind {
        IndexKind::Block => serde_json::to_string_pretty(&reader.blocks_for_address(token, limit).await?),
        IndexKind::Uncle => serde_json::to_string_pretty(&reader.uncles_for_address(token, limit).await?),
        IndexKind::Transaction => {
            serde_json::to_string_pretty(&reader.transactions_for_address(token, limit).await?)
        }
        IndexKind::InternalTransaction => serde_json::to_string_pretty(
            &reader
                .internal_transactions_for_address(token, limit)
                .await?,
        ),
        IndexKind::Erc20 => serde_json::to_string_pretty(&reader.erc20_for_address(token, limit).await?),
        IndexKind::Erc721 => serde_json::to_string_pretty(&reader.erc721_for_address(token, limit).await?),
        IndexKind::Erc1155 => {
            serde_json::to_string_pretty(&reader.erc1155_for_address(token, limit).await?)
        }
    }?;
    Ok(json)
}
