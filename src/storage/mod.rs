pub mod encoding;
pub mod manager;
pub mod reader;
pub mod rocksdb;
pub mod schema;
pub mod writer;
