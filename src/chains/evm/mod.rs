pub mod balance_cache;
pub mod checker;
pub mod cleaner;
pub mod context;
pub mod decoder;
pub mod indexer;
pub mod reward;
pub mod transform;
