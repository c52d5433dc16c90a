//! Bounded fan-out of page fetches with independent per-page ingestion.
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::{PageRequest, Resource};
use crate::pagination::plan_remaining;
use crate::shelter::PageFetcher;
use crate::sink::BulkUpsertSink;

/// A page that was fetched and handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedPage {
    pub page_number: u32,
    pub total_count: u64,
    /// Business codes of the records written, in page order.
    pub codes: Vec<String>,
}

/// A page that could not be ingested. Kept so an operator can re-run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub resource: Resource,
    pub page_number: u32,
    pub error_kind: &'static str,
    pub message: String,
}

impl PageFailure {
    pub fn new(request: &PageRequest, err: &SyncError) -> Self {
        Self {
            resource: request.resource.clone(),
            page_number: request.page_number,
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type PageOutcome = Result<IngestedPage, PageFailure>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub pages_ingested: usize,
    pub records: usize,
    /// Business codes written, only for resources a later stage fans out
    /// over (cities). Empty otherwise.
    pub codes: Vec<String>,
    pub failures: Vec<PageFailure>,
    keep_codes: bool,
}

impl IngestReport {
    pub fn for_resource(resource: &Resource) -> Self {
        Self {
            keep_codes: matches!(resource, Resource::Cities),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            Ok(page) => {
                self.pages_ingested += 1;
                self.records += page.codes.len();
                if self.keep_codes {
                    self.codes.extend(page.codes);
                }
            }
            Err(failure) => self.failures.push(failure),
        }
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.pages_ingested += other.pages_ingested;
        self.records += other.records;
        self.codes.extend(other.codes);
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PageIngestor {
    fetcher: Arc<dyn PageFetcher>,
    sink: Arc<dyn BulkUpsertSink>,
    page_size: u32,
    max_concurrency: usize,
}

impl PageIngestor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn BulkUpsertSink>,
        page_size: u32,
        max_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            sink,
            page_size,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Fetch one page and upsert its records as a single batch.
    pub async fn ingest_page(&self, request: &PageRequest) -> Result<IngestedPage, SyncError> {
        let page = self.fetcher.fetch(request).await?;
        let codes = page
            .items
            .iter()
            .map(|item| item.business_code().to_string())
            .collect();
        self.sink.upsert_batch(&page.items).await?;
        debug!(
            resource = %request.resource,
            page = page.page_number,
            records = page.items.len(),
            "page ingested"
        );
        Ok(IngestedPage {
            page_number: page.page_number,
            total_count: page.total_count,
            codes,
        })
    }

    /// Per-page completions in arrival order, at most `max_concurrency` in flight.
    pub fn stream_remaining(
        &self,
        resource: Resource,
        page_numbers: Vec<u32>,
    ) -> impl Stream<Item = PageOutcome> + '_ {
        stream::iter(page_numbers)
            .map(move |page_number| {
                let request = PageRequest::new(resource.clone(), page_number, self.page_size);
                async move {
                    self.ingest_page(&request)
                        .await
                        .map_err(|err| PageFailure::new(&request, &err))
                }
            })
            .buffer_unordered(self.max_concurrency)
    }

    /// Ingest the given pages; failures are isolated per page and collected.
    pub async fn ingest_remaining(&self, resource: Resource, page_numbers: Vec<u32>) -> IngestReport {
        let mut report = IngestReport::for_resource(&resource);
        if page_numbers.is_empty() {
            return report;
        }
        let requested = page_numbers.len();
        let outcomes = self.stream_remaining(resource.clone(), page_numbers);
        futures::pin_mut!(outcomes);
        while let Some(outcome) = outcomes.next().await {
            if let Err(failure) = &outcome {
                warn!(
                    resource = %failure.resource,
                    page = failure.page_number,
                    error_kind = failure.error_kind,
                    error = %failure.message,
                    "page ingestion failed"
                );
            }
            report.record(outcome);
        }
        info!(
            %resource,
            requested,
            ingested = report.pages_ingested,
            failed = report.failures.len(),
            "remaining pages ingested"
        );
        report
    }

    /// Ingest page 1, plan the rest from its total count and ingest those.
    ///
    /// Only a failing first page is an error; later pages are reported.
    pub async fn ingest_all(&self, resource: Resource) -> Result<IngestReport, SyncError> {
        let first = PageRequest::new(resource.clone(), 1, self.page_size);
        let first_page = self.ingest_page(&first).await?;
        let total_count = i64::try_from(first_page.total_count).map_err(|_| {
            SyncError::UpstreamMalformed(format!("totalCount {} out of range", first_page.total_count))
        })?;
        let remaining = plan_remaining(total_count, i64::from(self.page_size))?;
        info!(
            %resource,
            total_count,
            remaining_pages = remaining.len(),
            "first page ingested"
        );

        let mut report = IngestReport::for_resource(&resource);
        report.record(Ok(first_page));
        report.merge(self.ingest_remaining(resource, remaining).await);
        Ok(report)
    }
}
