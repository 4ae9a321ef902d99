use std::sync::Arc;

use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, DBCompactionStyle, DBCompressionType, Direction,
    IteratorMode, Options, WriteBatch,
};
use tracing::debug;

use crate::core::error::{IndexerError, Result};
use crate::core::storage::{Cell, Mutation, Row, RowRange, RowStore, Table};
use crate::utils::format::format_size_bytes;

#[derive(Clone, Debug)]
pub struct DatabaseHealth {
    pub num_keys: u64,
    pub sst_size: u64,
    pub l0_files: u64,
    pub is_healthy: bool,
}

#[derive(Clone)]
pub struct RocksDBStorage {
    db: Arc<DB>,
}

impl RocksDBStorage {
    pub fn new(path: &str) -> Result<Self> {
        Self::open(path, true)
    }

    pub fn open(path: &str, compression: bool) -> Result<Self> {
        let mut opts = Self::db_options(compression);
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = Table::ALL
            .iter()
            .map(|table| {
                ColumnFamilyDescriptor::new(table.as_str(), Self::db_options(compression))
            })
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        debug!(path, "Opened RocksDB with column families");
        Ok(Self { db: Arc::new(db) })
    }

    /// Read-only handle for inspection commands running next to a writer.
    pub fn open_read_only(path: &str) -> Result<Self> {
        let opts = Options::default();
        let names = Table::ALL.iter().map(|t| t.as_str());
        let db = DB::open_cf_for_read_only(&opts, path, names, false)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn db_options(compression: bool) -> Options {
        let mut opts = Options::default();

        // Write buffers: fewer flushes under bulk ingestion
        opts.set_write_buffer_size(256 * 1024 * 1024);
        opts.set_max_write_buffer_number(6);
        opts.set_min_write_buffer_number_to_merge(2);

        // SST sizing
        opts.set_target_file_size_base(512 * 1024 * 1024);
        opts.set_max_bytes_for_level_base(2 * 1024 * 1024 * 1024);
        opts.set_max_bytes_for_level_multiplier(10.0);

        if compression {
            opts.set_compression_type(DBCompressionType::Lz4);
        } else {
            opts.set_compression_type(DBCompressionType::None);
        }
        opts.set_compaction_style(DBCompactionStyle::Universal);
        opts.set_max_background_jobs(8);
        opts.set_max_subcompactions(4);

        // WAL limits
        opts.set_max_total_wal_size(1024 * 1024 * 1024);
        opts.set_wal_bytes_per_sync(16 * 1024 * 1024);
        opts.set_bytes_per_sync(16 * 1024 * 1024);

        opts.set_paranoid_checks(true);
        opts.set_level_zero_file_num_compaction_trigger(8);
        opts.set_level_zero_slowdown_writes_trigger(20);
        opts.set_level_zero_stop_writes_trigger(36);
        opts
    }

    fn cf(&self, table: Table) -> Result<&ColumnFamily> {
        self.db.cf_handle(table.as_str()).ok_or_else(|| {
            IndexerError::StorageLayout(format!("column family {} is missing", table.as_str()))
        })
    }

    fn property_u64(&self, name: &str) -> Result<u64> {
        let mut total = 0;
        for table in Table::ALL {
            total += self
                .db
                .property_value_cf(self.cf(table)?, name)?
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
        }
        Ok(total)
    }

    /// Database health check
    pub fn health_check(&self) -> Result<DatabaseHealth> {
        let num_keys = self.property_u64("rocksdb.estimate-num-keys")?;
        let sst_size = self.property_u64("rocksdb.total-sst-files-size")?;
        let l0_files = self.property_u64("rocksdb.num-files-at-level0")?;

        Ok(DatabaseHealth {
            num_keys,
            sst_size,
            l0_files,
            is_healthy: l0_files < 20,
        })
    }

    pub fn flush(&self) -> Result<()> {
        for table in Table::ALL {
            self.db.flush_cf(self.cf(table)?)?;
        }
        Ok(())
    }

    /// Size across all tables in human-readable form (e.g. "1.23 GB").
    pub fn get_db_size(&self) -> Result<String> {
        let total_sst = self.property_u64("rocksdb.total-sst-files-size")?;
        let live_data = self.property_u64("rocksdb.estimate-live-data-size")?;
        Ok(format_size_bytes(total_sst.max(live_data)))
    }

    fn decode_row(key: &[u8], value: &[u8], strip_values: bool) -> Result<Row> {
        let key = String::from_utf8(key.to_vec())
            .map_err(|e| IndexerError::StorageLayout(format!("row key is not UTF-8: {e}")))?;
        let mut cells: Vec<Cell> = serde_json::from_slice(value)?;
        if strip_values {
            for cell in &mut cells {
                cell.value.clear();
            }
        }
        Ok(Row { key, cells })
    }
}

impl RowStore for RocksDBStorage {
    fn apply_bulk(&self, table: Table, keys: &[String], mutations: &[Mutation]) -> Result<()> {
        if keys.len() != mutations.len() {
            return Err(IndexerError::BulkLengthMismatch {
                keys: keys.len(),
                mutations: mutations.len(),
            });
        }

        let cf = self.cf(table)?;
        let mut batch = WriteBatch::default();
        for (key, mutation) in keys.iter().zip(mutations) {
            match mutation {
                Mutation::SetCell { column, value } => {
                    let cells = [Cell {
                        column: column.clone(),
                        value: value.clone(),
                    }];
                    batch.put_cf(cf, key.as_bytes(), serde_json::to_vec(&cells)?);
                }
                Mutation::DeleteRow => batch.delete_cf(cf, key.as_bytes()),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn read_row(&self, table: Table, key: &str) -> Result<Option<Row>> {
        match self.db.get_cf(self.cf(table)?, key.as_bytes())? {
            Some(value) => Ok(Some(Self::decode_row(key.as_bytes(), &value, false)?)),
            None => Ok(None),
        }
    }

    fn read_rows(&self, table: Table, keys: &[String]) -> Result<Vec<Row>> {
        let cf = self.cf(table)?;
        let values = self
            .db
            .multi_get_cf(keys.iter().map(|key| (cf, key.as_bytes())));

        let mut rows = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            if let Some(value) = value? {
                rows.push(Self::decode_row(key.as_bytes(), &value, false)?);
            }
        }
        Ok(rows)
    }

    fn for_each_row(
        &self,
        table: Table,
        range: &RowRange,
        strip_values: bool,
        visit: &mut dyn FnMut(Row) -> bool,
    ) -> Result<()> {
        let iter = self.db.iterator_cf(
            self.cf(table)?,
            IteratorMode::From(&range.start, Direction::Forward),
        );

        for item in iter {
            let (key, value) = item?;
            if range.is_past_end(&key) {
                break;
            }
            if !visit(Self::decode_row(&key, &value, strip_values)?) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (RocksDBStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("rocksdb");
        let storage = RocksDBStorage::new(path.to_str().expect("utf-8 path"))
            .expect("Failed to create test storage");
        (storage, temp_dir)
    }

    fn put(storage: &RocksDBStorage, table: Table, key: &str, column: &str, value: &str) {
        storage
            .apply_bulk(table, &[key.to_string()], &[Mutation::set(column, value)])
            .expect("Failed to write");
    }

    #[test]
    fn test_set_and_read_row() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Data, "1:TX:aa", "data", "{\"v\":1}");
        let row = storage
            .read_row(Table::Data, "1:TX:aa")
            .expect("Failed to read")
            .expect("row missing");

        assert_eq!(row.key, "1:TX:aa");
        assert_eq!(row.cell("data").map(|c| c.value.as_str()), Some("{\"v\":1}"));
        assert!(storage.read_row(Table::Blocks, "1:TX:aa").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites_instead_of_accumulating() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Data, "k", "data", "first");
        put(&storage, Table::Data, "k", "data", "second");

        let row = storage.read_row(Table::Data, "k").unwrap().unwrap();
        assert_eq!(row.cells.len(), 1);
        assert_eq!(row.cells[0].value, "second");
    }

    #[test]
    fn test_delete_row() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Data, "k", "data", "v");
        storage
            .apply_bulk(Table::Data, &["k".to_string()], &[Mutation::DeleteRow])
            .expect("Failed to delete");

        assert!(storage.read_row(Table::Data, "k").unwrap().is_none());
    }

    #[test]
    fn test_mismatched_bulk_is_rejected() {
        let (storage, _dir) = create_test_storage();

        let err = storage
            .apply_bulk(Table::Data, &["a".to_string(), "b".to_string()], &[Mutation::DeleteRow])
            .expect_err("expected mismatch");
        assert!(matches!(
            err,
            IndexerError::BulkLengthMismatch {
                keys: 2,
                mutations: 1
            }
        ));
    }

    #[test]
    fn test_read_rows_skips_missing() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Data, "a", "data", "1");
        put(&storage, Table::Data, "c", "data", "3");

        let keys = ["a", "b", "c"].map(String::from);
        let rows = storage.read_rows(Table::Data, &keys).expect("Failed to read");
        let found: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(found, vec!["a", "c"]);
    }

    #[test]
    fn test_scan_open_interval_and_strip() {
        let (storage, _dir) = create_test_storage();

        for key in ["1:B:", "1:B:1", "1:B:2", "1:B:3", "1:TX:1"] {
            put(&storage, Table::Data, key, "data", "payload");
        }

        let range = RowRange::new("1:B:\0", "1:B;");
        let rows = storage
            .scan(Table::Data, &range, None, true)
            .expect("Failed to scan");
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["1:B:1", "1:B:2", "1:B:3"]);
        assert!(rows.iter().all(|r| r.cells[0].value.is_empty()));

        let limited = storage.scan(Table::Data, &range, Some(2), false).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].cells[0].value, "payload");
    }

    #[test]
    fn test_tables_are_isolated() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Blocks, "1:999999999", "data", "raw");
        put(&storage, Table::MetadataUpdates, "B:aa:00", "data", "");

        let all = RowRange::new("", "");
        assert_eq!(storage.scan(Table::Data, &all, None, true).unwrap().len(), 0);
        assert_eq!(storage.scan(Table::Blocks, &all, None, true).unwrap().len(), 1);
        assert_eq!(
            storage
                .scan(Table::MetadataUpdates, &all, None, true)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_health_and_size() {
        let (storage, _dir) = create_test_storage();

        put(&storage, Table::Data, "k", "data", "v");
        storage.flush().expect("Failed to flush");

        let health = storage.health_check().expect("Failed health check");
        assert!(health.is_healthy);
        assert!(!storage.get_db_size().expect("size").is_empty());
    }
}
