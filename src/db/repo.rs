use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use thiserror::Error;
use tracing::instrument;

use super::model::{FailedPage, SyncRunRow, VersionedPost, VersionedTag};
use crate::retry::OptimisticConflict;
use crate::sync::{RunOutcome, RunReport};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Single-connection in-memory database; every connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<Pool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. Other URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Persist a finished run and every page it failed to ingest.
#[instrument(skip_all, fields(run_id = %report.run_id))]
pub async fn record_run(pool: &Pool, report: &RunReport) -> Result<()> {
    let (outcome, failed_stage, error) = match &report.outcome {
        RunOutcome::Completed => ("completed", None, None),
        RunOutcome::Failed { stage, error } => ("failed", Some(stage.as_str()), Some(error.as_str())),
    };
    let run_id = report.run_id.to_string();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO sync_runs (run_id, plan, window_start, window_end, outcome, failed_stage, error, pages_ingested, pages_failed)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&run_id)
    .bind(report.plan.as_str())
    .bind(report.window.start_param())
    .bind(report.window.end_param())
    .bind(outcome)
    .bind(failed_stage)
    .bind(error)
    .bind(report.pages_ingested() as i64)
    .bind(report.failures.len() as i64)
    .execute(&mut *tx)
    .await?;

    for failure in &report.failures {
        sqlx::query(
            "INSERT INTO sync_page_failures (run_id, resource_kind, scope, page_no, error_kind, message)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run_id)
        .bind(failure.resource.kind().as_str())
        .bind(failure.resource.scope())
        .bind(i64::from(failure.page_number))
        .bind(failure.error_kind)
        .bind(&failure.message)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn latest_run(pool: &Pool, plan: Option<&str>) -> Result<Option<SyncRunRow>> {
    let row = sqlx::query_as::<_, SyncRunRow>(
        "SELECT run_id, plan, window_start, window_end, outcome, failed_stage, error, pages_ingested, pages_failed
         FROM sync_runs
         WHERE (?1 IS NULL OR plan = ?1)
         ORDER BY datetime(finished_at) DESC, rowid DESC
         LIMIT 1",
    )
    .bind(plan)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn failed_pages(pool: &Pool, run_id: &str) -> Result<Vec<FailedPage>> {
    let rows = sqlx::query_as::<_, FailedPage>(
        "SELECT run_id, resource_kind, scope, page_no, error_kind, message
         FROM sync_page_failures WHERE run_id = ? ORDER BY page_no",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to load page failures")?;
    Ok(rows)
}

/// Serving-path storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    /// The row changed since it was loaded; the write was not applied.
    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: i64,
        expected: i64,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OptimisticConflict for StoreError {
    fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

#[instrument(skip_all)]
pub async fn create_post(pool: &Pool, title: &str, content: Option<&str>) -> Result<i64, StoreError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO missing_posts (title, content) VALUES (?, ?) RETURNING id",
    )
    .bind(title)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn load_post_for_update(pool: &Pool, post_id: i64) -> Result<VersionedPost, StoreError> {
    sqlx::query_as::<_, VersionedPost>(
        "SELECT id, title, view_count, version FROM missing_posts WHERE id = ?",
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound {
        entity: "missing_post",
        id: post_id,
    })
}

/// Write `view_count` only if the row still carries `post.version`.
#[instrument(skip_all)]
pub async fn update_view_count(
    pool: &Pool,
    post: &VersionedPost,
    view_count: i64,
) -> Result<(), StoreError> {
    let res = sqlx::query(
        "UPDATE missing_posts SET view_count = ?, version = version + 1 WHERE id = ? AND version = ?",
    )
    .bind(view_count)
    .bind(post.id)
    .bind(post.version)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(StoreError::VersionConflict {
            entity: "missing_post",
            id: post.id,
            expected: post.version,
        });
    }
    Ok(())
}

/// Delete a post in one transaction: drop its tag links, decrease the count
/// of exactly the tags whose links this call removed, then delete the row.
///
/// Returns the number of tags decreased. A concurrent delete that already
/// claimed the links finds nothing and ends in `NotFound` with no writes.
#[instrument(skip_all)]
pub async fn delete_post(pool: &Pool, post_id: i64) -> Result<usize, StoreError> {
    let mut tx = pool.begin().await?;
    let tag_ids = sqlx::query_scalar::<_, i64>(
        "DELETE FROM post_tags WHERE post_id = ? RETURNING tag_id",
    )
    .bind(post_id)
    .fetch_all(&mut *tx)
    .await?;

    for &tag_id in &tag_ids {
        let tag = sqlx::query_as::<_, VersionedTag>(
            "SELECT id, name, count, version FROM tags WHERE id = ?",
        )
        .bind(tag_id)
        .fetch_one(&mut *tx)
        .await?;
        let res = sqlx::query(
            "UPDATE tags SET count = ?, version = version + 1 WHERE id = ? AND version = ?",
        )
        .bind((tag.count - 1).max(0))
        .bind(tag.id)
        .bind(tag.version)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "tag",
                id: tag.id,
                expected: tag.version,
            });
        }
    }

    let res = sqlx::query("DELETE FROM missing_posts WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "missing_post",
            id: post_id,
        });
    }
    tx.commit().await?;
    Ok(tag_ids.len())
}

/// Link a tag (created on first use) to a post and bump its count.
#[instrument(skip_all)]
pub async fn attach_tag(pool: &Pool, post_id: i64, name: &str) -> Result<i64, StoreError> {
    let mut tx = pool.begin().await?;
    let tag_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO tags (name) VALUES (?)
         ON CONFLICT(name) DO UPDATE SET name = excluded.name
         RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut *tx)
    .await?;
    let linked = sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
        .bind(post_id)
        .bind(tag_id)
        .execute(&mut *tx)
        .await?;
    if linked.rows_affected() > 0 {
        sqlx::query("UPDATE tags SET count = count + 1, version = version + 1 WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(tag_id)
}

#[instrument(skip_all)]
pub async fn tags_for_post(pool: &Pool, post_id: i64) -> Result<Vec<VersionedTag>, StoreError> {
    let rows = sqlx::query_as::<_, VersionedTag>(
        "SELECT t.id, t.name, t.count, t.version
         FROM tags t JOIN post_tags pt ON pt.tag_id = t.id
         WHERE pt.post_id = ? ORDER BY t.id",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn load_tag_for_update(pool: &Pool, tag_id: i64) -> Result<VersionedTag, StoreError> {
    sqlx::query_as::<_, VersionedTag>("SELECT id, name, count, version FROM tags WHERE id = ?")
        .bind(tag_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "tag",
            id: tag_id,
        })
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> Pool {
    init_memory_pool().await.unwrap()
}
