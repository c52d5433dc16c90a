//! Serving-path operations on versioned aggregates.
//!
//! Every read-modify-write goes through [`retry::execute`], which re-runs the
//! whole load + write on a version conflict.
use tracing::{info, instrument};

use crate::config::Serving;
use crate::db::{self, Pool, StoreError, VersionedPost};
use crate::retry::{self, RetryError};

pub const VIEW_COUNT_LABEL: &str = "increase post view count";
pub const TAG_COUNT_LABEL: &str = "decrease tag count on post delete";

pub type PostResult<T> = Result<T, RetryError<StoreError>>;

pub struct PostService {
    pool: Pool,
    max_attempts: u32,
}

impl PostService {
    pub fn new(pool: Pool, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }

    pub fn from_config(pool: Pool, cfg: &Serving) -> Self {
        Self::new(pool, cfg.max_conflict_attempts)
    }

    /// Increment the post's view count and return the updated row.
    #[instrument(skip(self))]
    pub async fn view_post(&self, post_id: i64) -> PostResult<VersionedPost> {
        let pool = &self.pool;
        retry::execute(VIEW_COUNT_LABEL, self.max_attempts, || async move {
            let post = db::load_post_for_update(pool, post_id).await?;
            let view_count = post.view_count + 1;
            db::update_view_count(pool, &post, view_count).await?;
            Ok::<_, StoreError>(VersionedPost {
                view_count,
                version: post.version + 1,
                ..post
            })
        })
        .await
    }

    /// Delete the post, decreasing the count of each tag it carried. The
    /// whole delete is one transaction, re-run on a tag version conflict.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: i64) -> PostResult<()> {
        let pool = &self.pool;
        let tags = retry::execute(TAG_COUNT_LABEL, self.max_attempts, || {
            db::delete_post(pool, post_id)
        })
        .await?;
        info!(post_id, tags, "post deleted");
        Ok(())
    }
}
