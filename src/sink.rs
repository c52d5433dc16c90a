use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::ReferenceEntity;

/// Idempotent, code-keyed persistence of decoded registry records.
///
/// Duplicate business codes within a batch or across calls converge on the
/// last written values. Only genuine storage failures return
/// [`SyncError::Persistence`].
#[async_trait]
pub trait BulkUpsertSink: Send + Sync {
    async fn upsert_batch(&self, records: &[ReferenceEntity]) -> Result<(), SyncError>;
}
