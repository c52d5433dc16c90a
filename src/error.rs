//! Error taxonomy for the registry sync pipeline.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Transport failure, timeout, non-2xx status or an upstream rejection code.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The response could not be decoded into the expected envelope.
    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl SyncError {
    /// Page-isolated errors are recorded against their page while the rest of
    /// the run continues. Persistence errors are fatal for their batch.
    pub fn is_page_isolated(&self) -> bool {
        matches!(
            self,
            SyncError::UpstreamUnavailable(_) | SyncError::UpstreamMalformed(_)
        )
    }

    /// Short, stable tag stored in the failure ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidArgument(_) => "invalid_argument",
            SyncError::UpstreamUnavailable(_) => "upstream_unavailable",
            SyncError::UpstreamMalformed(_) => "upstream_malformed",
            SyncError::Persistence(_) => "persistence",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the service key as a query parameter.
        let err = err.without_url();
        if err.is_decode() {
            SyncError::UpstreamMalformed(err.to_string())
        } else {
            SyncError::UpstreamUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_are_isolated_per_page() {
        assert!(SyncError::UpstreamUnavailable("timeout".into()).is_page_isolated());
        assert!(SyncError::UpstreamMalformed("bad body".into()).is_page_isolated());
        assert!(!SyncError::Persistence(sqlx::Error::PoolTimedOut).is_page_isolated());
        assert!(!SyncError::InvalidArgument("negative".into()).is_page_isolated());
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(SyncError::UpstreamUnavailable(String::new()).kind(), "upstream_unavailable");
        assert_eq!(SyncError::Persistence(sqlx::Error::RowNotFound).kind(), "persistence");
    }
}
