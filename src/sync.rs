//! Stage orchestration for one registry sync run.
//!
//! Stages run strictly in order, each one a barrier for the next:
//! `AnimalKinds -> Cities -> Towns -> ShelterPosts`. Towns need their parent
//! city rows and shelter posts are resolved against all of them.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Shelter;
use crate::db::{FailedPage, SyncRunRow};
use crate::error::SyncError;
use crate::ingest::{IngestReport, PageFailure, PageIngestor};
use crate::model::{PageRequest, Resource, ResourceKind, SyncWindow};
use crate::shelter::PageFetcher;
use crate::sink::BulkUpsertSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AnimalKinds,
    Cities,
    Towns,
    ShelterPosts,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AnimalKinds => "animal_kinds",
            Stage::Cities => "cities",
            Stage::Towns => "towns",
            Stage::ShelterPosts => "shelter_posts",
        }
    }

    /// Any failure in a critical stage leaves later stages unresolvable.
    pub fn is_critical(&self) -> bool {
        matches!(self, Stage::AnimalKinds | Stage::Cities)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Shelter posts of the window only. The scheduled run; also re-ingests a
    /// window whose first page failed.
    Daily,
    /// Seeding/recovery: every stage.
    Full,
    /// Re-ingest specific shelter-post pages of the window.
    Pages(Vec<u32>),
}

impl SyncPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPlan::Daily => "daily",
            SyncPlan::Full => "full",
            SyncPlan::Pages(_) => "pages",
        }
    }

    pub fn stages(&self) -> &'static [Stage] {
        match self {
            SyncPlan::Daily | SyncPlan::Pages(_) => &[Stage::ShelterPosts],
            SyncPlan::Full => &[
                Stage::AnimalKinds,
                Stage::Cities,
                Stage::Towns,
                Stage::ShelterPosts,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub pages_ingested: usize,
    pub records: usize,
    pub pages_failed: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub plan: SyncPlan,
    pub window: SyncWindow,
    pub stages: Vec<StageReport>,
    pub failures: Vec<PageFailure>,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(plan: SyncPlan, window: SyncWindow) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plan,
            window,
            stages: Vec::new(),
            failures: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn pages_ingested(&self) -> usize {
        self.stages.iter().map(|s| s.pages_ingested).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Plans that re-ingest what a recorded run failed on.
///
/// Any failure outside shelter posts needs a `Full` run of the run's window.
/// A shelter-post window whose first page failed is ingested whole again,
/// since its page count was never known; otherwise only its failed pages.
pub fn retry_plans(
    run: &SyncRunRow,
    failed: &[FailedPage],
) -> Result<Vec<(SyncPlan, SyncWindow)>, SyncError> {
    let shelter_post = ResourceKind::ShelterPost.as_str();
    if failed.iter().any(|page| page.resource_kind != shelter_post) {
        return Ok(vec![(SyncPlan::Full, SyncWindow::parse(&run.window_start)?)]);
    }

    let mut by_window: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for page in failed {
        let Some(scope) = page.scope.as_deref() else {
            continue;
        };
        let page_no = u32::try_from(page.page_no).map_err(|_| {
            SyncError::InvalidArgument(format!("recorded page number {}", page.page_no))
        })?;
        by_window.entry(scope).or_default().push(page_no);
    }

    by_window
        .into_iter()
        .map(|(scope, mut pages)| {
            let window = SyncWindow::parse(scope)?;
            pages.sort_unstable();
            pages.dedup();
            let plan = if pages.contains(&1) {
                SyncPlan::Daily
            } else {
                SyncPlan::Pages(pages)
            };
            Ok((plan, window))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    pub max_concurrency: usize,
    pub animal_kind_codes: Vec<String>,
}

impl From<&Shelter> for SyncSettings {
    fn from(cfg: &Shelter) -> Self {
        Self {
            page_size: cfg.page_size,
            max_concurrency: cfg.max_concurrency,
            animal_kind_codes: cfg.animal_kind_codes.clone(),
        }
    }
}

/// What a stage had ingested when it hit a fatal page.
struct StageFailure {
    partial: IngestReport,
    failure: PageFailure,
}

pub struct ReferenceSync {
    ingestor: PageIngestor,
    animal_kind_codes: Vec<String>,
}

impl ReferenceSync {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn BulkUpsertSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            ingestor: PageIngestor::new(
                fetcher,
                sink,
                settings.page_size,
                settings.max_concurrency,
            ),
            animal_kind_codes: settings.animal_kind_codes,
        }
    }

    pub fn ingestor(&self) -> &PageIngestor {
        &self.ingestor
    }

    /// Run every stage of `plan` in order. Page failures are collected; a
    /// failing critical stage ends the run as `Failed`.
    pub async fn run(&self, plan: SyncPlan, window: SyncWindow) -> RunReport {
        let mut report = RunReport::new(plan.clone(), window);
        info!(run_id = %report.run_id, plan = plan.as_str(), %window, "sync run started");

        let mut city_codes: Vec<String> = Vec::new();
        for &stage in plan.stages() {
            info!(run_id = %report.run_id, %stage, "stage started");
            let ingest = match self.run_stage(stage, &plan, window, &city_codes).await {
                Ok(ingest) => ingest,
                Err(StageFailure { partial, failure }) => {
                    error!(
                        run_id = %report.run_id,
                        %stage,
                        resource = %failure.resource,
                        error = %failure.message,
                        "stage failed"
                    );
                    report.stages.push(StageReport {
                        stage,
                        pages_ingested: partial.pages_ingested,
                        records: partial.records,
                        pages_failed: partial.failures.len() + 1,
                    });
                    report.outcome = RunOutcome::Failed {
                        stage,
                        error: failure.message.clone(),
                    };
                    report.failures.extend(partial.failures);
                    report.failures.push(failure);
                    break;
                }
            };

            if stage == Stage::Cities {
                city_codes = ingest.codes.clone();
                city_codes.sort();
                city_codes.dedup();
            }
            report.stages.push(StageReport {
                stage,
                pages_ingested: ingest.pages_ingested,
                records: ingest.records,
                pages_failed: ingest.failures.len(),
            });
            let clean = ingest.is_clean();
            let failed = ingest.failures.len();
            report.failures.extend(ingest.failures);

            if !clean && stage.is_critical() {
                error!(run_id = %report.run_id, %stage, failed, "critical stage incomplete");
                report.outcome = RunOutcome::Failed {
                    stage,
                    error: format!("{failed} page(s) failed"),
                };
                break;
            }
            info!(
                run_id = %report.run_id,
                %stage,
                pages = ingest.pages_ingested,
                records = ingest.records,
                failed,
                "stage finished"
            );
        }

        match &report.outcome {
            RunOutcome::Completed => info!(
                run_id = %report.run_id,
                pages = report.pages_ingested(),
                failed_pages = report.failures.len(),
                "sync run completed"
            ),
            RunOutcome::Failed { stage, error } => error!(
                run_id = %report.run_id,
                %stage,
                %error,
                "sync run failed"
            ),
        }
        report
    }

    async fn run_stage(
        &self,
        stage: Stage,
        plan: &SyncPlan,
        window: SyncWindow,
        city_codes: &[String],
    ) -> Result<IngestReport, StageFailure> {
        match stage {
            Stage::AnimalKinds => {
                let mut report = IngestReport::default();
                for code in &self.animal_kind_codes {
                    let resource = Resource::AnimalKinds {
                        up_kind_code: code.clone(),
                    };
                    match self.ingest_all(resource).await {
                        Ok(kinds) => report.merge(kinds),
                        Err(mut failed) => {
                            report.merge(failed.partial);
                            failed.partial = report;
                            return Err(failed);
                        }
                    }
                }
                Ok(report)
            }
            Stage::Cities => self.ingest_all(Resource::Cities).await,
            Stage::Towns => Ok(self.sync_towns(city_codes).await),
            Stage::ShelterPosts => {
                let resource = Resource::ShelterPosts { window };
                match plan {
                    SyncPlan::Pages(pages) => {
                        Ok(self.ingestor.ingest_remaining(resource, pages.clone()).await)
                    }
                    SyncPlan::Daily | SyncPlan::Full => self.ingest_all(resource).await,
                }
            }
        }
    }

    /// `ingest_all` with its error pinned to the first page of `resource`.
    async fn ingest_all(&self, resource: Resource) -> Result<IngestReport, StageFailure> {
        let first = PageRequest::new(resource.clone(), 1, self.ingestor.page_size());
        self.ingestor
            .ingest_all(resource)
            .await
            .map_err(|err| StageFailure {
                partial: IngestReport::default(),
                failure: PageFailure::new(&first, &err),
            })
    }

    /// Towns of each city, one city at a time so the ingestor's bound holds.
    async fn sync_towns(&self, city_codes: &[String]) -> IngestReport {
        let mut report = IngestReport::default();
        for code in city_codes {
            let resource = Resource::Towns {
                city_code: code.clone(),
            };
            match self.ingest_all(resource).await {
                Ok(towns) => report.merge(towns),
                Err(StageFailure { partial, failure }) => {
                    warn!(city_code = %code, error = %failure.message, "town sync failed for city");
                    report.merge(partial);
                    report.failures.push(failure);
                }
            }
        }
        report
    }
}
