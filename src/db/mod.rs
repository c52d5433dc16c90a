//! Database module: SQLite pool, the registry upsert sink, the sync-run
//! ledger and the versioned serving-path repository.
//!
//! - `model`: rows returned by repositories.
//! - `repo`: pool setup, the run ledger and versioned post/tag access.
//! - `upsert`: [`SqliteSink`], the code-keyed [`crate::sink::BulkUpsertSink`].

pub mod model;
pub mod repo;
pub mod upsert;

pub use repo::*;
pub use upsert::SqliteSink;

pub use model::{FailedPage, SyncRunRow, VersionedPost, VersionedTag};
