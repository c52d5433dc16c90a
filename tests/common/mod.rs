#![allow(dead_code)]

use chrono::NaiveDate;
use shelter_sync::error::SyncError;
use shelter_sync::model::{
    AnimalKind, City, PageRequest, PageResult, ReferenceEntity, Resource, ShelterPost, Town,
};
use shelter_sync::shelter::PageFetcher;
use shelter_sync::sink::BulkUpsertSink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

pub async fn setup_pool() -> sqlx::SqlitePool {
    shelter_sync::db::init_memory_pool().await.unwrap()
}

pub fn found_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 11, 5).unwrap()
}

/// How a scripted page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Malformed,
}

/// Scripted registry: a total count per resource, deterministic items per
/// page, and optional failing pages. Records every request it receives.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    totals: Arc<Mutex<HashMap<Resource, u64>>>,
    failing: Arc<Mutex<HashMap<(Resource, u32), Fault>>>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<PageRequest>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeRegistry {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub async fn set_total(&self, resource: Resource, total: u64) {
        self.totals.lock().await.insert(resource, total);
    }

    pub async fn fail_page(&self, resource: Resource, page_number: u32) {
        self.fail_page_with(resource, page_number, Fault::Unavailable).await;
    }

    pub async fn fail_page_with(&self, resource: Resource, page_number: u32, fault: Fault) {
        self.failing.lock().await.insert((resource, page_number), fault);
    }

    pub async fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn pages_fetched(&self, resource: &Resource) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .calls()
            .await
            .into_iter()
            .filter(|r| &r.resource == resource)
            .map(|r| r.page_number)
            .collect();
        pages.sort();
        pages
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: &PageRequest) -> Result<PageResult, SyncError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = (request.resource.clone(), request.page_number);
        match self.failing.lock().await.get(&key) {
            Some(Fault::Unavailable) => {
                return Err(SyncError::UpstreamUnavailable(format!(
                    "scripted failure on page {}",
                    request.page_number
                )))
            }
            Some(Fault::Malformed) => {
                return Err(SyncError::UpstreamMalformed(format!(
                    "scripted bad body on page {}",
                    request.page_number
                )))
            }
            None => {}
        }
        let total = self
            .totals
            .lock()
            .await
            .get(&request.resource)
            .copied()
            .unwrap_or(0);
        let size = u64::from(request.page_size);
        let offset = u64::from(request.page_number - 1) * size;
        let count = total.saturating_sub(offset).min(size);
        let items = (offset..offset + count)
            .map(|i| item_for(&request.resource, i))
            .collect();
        Ok(PageResult {
            items,
            total_count: total,
            page_number: request.page_number,
        })
    }
}

#[async_trait::async_trait]
impl PageFetcher for FakeRegistry {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, SyncError> {
        self.calls.lock().await.push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.respond(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn city_name(code: &str) -> String {
    format!("city {code}")
}

pub fn town_name(code: &str) -> String {
    format!("town {code}")
}

fn item_for(resource: &Resource, index: u64) -> ReferenceEntity {
    match resource {
        Resource::AnimalKinds { up_kind_code } => ReferenceEntity::AnimalKind(AnimalKind {
            code: format!("{up_kind_code}-{index:03}"),
            name: format!("breed {up_kind_code}-{index:03}"),
            animal_code: up_kind_code.clone(),
        }),
        Resource::Cities => {
            let code = format!("C{index:03}");
            ReferenceEntity::City(City {
                name: city_name(&code),
                code,
            })
        }
        Resource::Towns { city_code } => {
            let code = format!("{city_code}-T{index:03}");
            ReferenceEntity::Town(Town {
                name: town_name(&code),
                code,
                parent_city_code: city_code.clone(),
            })
        }
        Resource::ShelterPosts { window } => ReferenceEntity::ShelterPost(ShelterPost {
            external_id: format!("{}-{index:05}", window.start_param()),
            found_date: window.start,
            found_place: Some("front gate".into()),
            city_name: Some(city_name("C000")),
            town_name: Some(town_name("C000-T000")),
            animal_name: Some("개".into()),
            animal_kind_name: Some("breed 417000-000".into()),
            age: Some("2021(년생)".into()),
            sex: Some("F".into()),
            color: Some("white".into()),
            weight: None,
            notice_number: None,
            image_url: None,
            status: Some("보호중".into()),
            neutered: Some("U".into()),
            feature: None,
            shelter_name: None,
            shelter_telephone: None,
            shelter_address: None,
        }),
    }
}

/// Records every batch it accepts, optionally forwarding to a real sink.
/// A batch holding `failing_code` is rejected as a storage failure.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<ReferenceEntity>>>>,
    inner: Option<Arc<dyn BulkUpsertSink>>,
    failing_code: Option<String>,
}

impl RecordingSink {
    pub fn forwarding(inner: Arc<dyn BulkUpsertSink>) -> Self {
        Self {
            inner: Some(inner),
            ..Default::default()
        }
    }

    pub fn failing_on(code: &str) -> Self {
        Self {
            failing_code: Some(code.to_string()),
            ..Default::default()
        }
    }

    pub async fn batches(&self) -> Vec<Vec<ReferenceEntity>> {
        self.batches.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl BulkUpsertSink for RecordingSink {
    async fn upsert_batch(&self, records: &[ReferenceEntity]) -> Result<(), SyncError> {
        if let Some(code) = &self.failing_code {
            if records.iter().any(|r| r.business_code() == code.as_str()) {
                return Err(SyncError::Persistence(sqlx::Error::Protocol(format!(
                    "scripted write failure on {code}"
                ))));
            }
        }
        if let Some(inner) = &self.inner {
            inner.upsert_batch(records).await?;
        }
        self.batches.lock().await.push(records.to_vec());
        Ok(())
    }
}
