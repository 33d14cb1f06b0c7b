//! Data retention and persistence modules.
pub mod batcher;
pub mod series;
pub mod storage;
