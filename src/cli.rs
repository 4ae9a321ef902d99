use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::storage::Table;
use crate::storage::schema::{IndexFilter, IndexKind};

#[derive(Parser, Debug)]
#[command(
    name = "indexer",
    version,
    about = "EVM block indexer over a RocksDB wide-column layout"
)]
pub struct Cli {
    /// Specify the config file path (default: ./config.yaml)
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Follow the blocks table and index new snapshots until stopped
    Run,

    /// Index a closed block range once
    Index {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
    },

    /// Load raw block snapshots (one JSON object per line) into the blocks table
    Import {
        #[arg(long)]
        file: PathBuf,
    },

    /// Verify the newest blocks of a table are contiguous
    CheckGaps {
        #[arg(long, value_enum, default_value_t = TableArg::Data)]
        table: TableArg,
        /// Number of newest blocks to inspect, 0 for all
        #[arg(long, default_value_t = 1000)]
        lookback: usize,
    },

    /// Print the highest block number stored in a table
    LastBlock {
        #[arg(long, value_enum, default_value_t = TableArg::Data)]
        table: TableArg,
    },

    /// Print one page of an address view as JSON
    Page {
        /// B, U, TX, ITX, ERC20, ERC721 or ERC1155
        #[arg(long)]
        kind: IndexKind,
        #[arg(long)]
        address: String,
        #[arg(long)]
        filter: Option<IndexFilter>,
        /// Continuation token from a previous page
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// Count the index rows of an address view
    Count {
        #[arg(long)]
        kind: IndexKind,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "TIME")]
        filter: IndexFilter,
    },

    /// Delete every row whose key starts with a prefix
    DeletePrefix {
        #[arg(long)]
        prefix: String,
        #[arg(long, value_enum, default_value_t = TableArg::Data)]
        table: TableArg,
    },
}

impl Commands {
    /// Commands that never write and can share the database with a running
    /// ingest process.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Commands::CheckGaps { .. }
                | Commands::LastBlock { .. }
                | Commands::Page { .. }
                | Commands::Count { .. }
        )
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableArg {
    Data,
    Blocks,
    MetadataUpdates,
}

impl From<TableArg> for Table {
    fn from(arg: TableArg) -> Self {
        match arg {
            TableArg::Data => Table::Data,
            TableArg::Blocks => Table::Blocks,
            TableArg::MetadataUpdates => Table::MetadataUpdates,
        }
    }
}
