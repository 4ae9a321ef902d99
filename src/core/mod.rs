pub mod cleaner;
pub mod decoder;
pub mod error;
pub mod indexer;
pub mod storage;
pub mod table;
pub mod types;
