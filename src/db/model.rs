//! Rows returned by repositories. Business logic lives in higher layers.

/// A missing-animal post as loaded for a versioned write.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VersionedPost {
    pub id: i64,
    pub title: String,
    pub view_count: i64,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VersionedTag {
    pub id: i64,
    pub name: String,
    pub count: i64,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SyncRunRow {
    pub run_id: String,
    pub plan: String,
    pub window_start: String,
    pub window_end: String,
    pub outcome: String,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub pages_ingested: i64,
    pub pages_failed: i64,
}

/// A page recorded as failed by a previous run.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FailedPage {
    pub run_id: String,
    pub resource_kind: String,
    pub scope: Option<String>,
    pub page_no: i64,
    pub error_kind: String,
    pub message: String,
}
