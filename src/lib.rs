pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pagination;
pub mod posts;
pub mod retry;
pub mod schedule;
pub mod shelter;
pub mod sink;
pub mod sync;
