use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Shelter;
use crate::error::SyncError;
use crate::model::{
    AnimalKind, City, PageRequest, PageResult, ReferenceEntity, Resource, ShelterPost, Town,
    REGISTRY_DATE_FORMAT,
};
use crate::shelter::model::{
    AbandonmentItem, Envelope, KindItem, SidoItem, SigunguItem, RESULT_OK,
};

pub mod model;

const SHELTER_POST_PATH: &str = "abandonmentPublic";
const ANIMAL_KIND_PATH: &str = "kind";
const CITY_PATH: &str = "sido";
const TOWN_PATH: &str = "sigungu";

/// "[개] 믹스견" -> ("개", "믹스견")
static KIND_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(?P<animal>[^\]]+)\]\s*(?P<kind>.*?)\s*$").expect("valid kind label regex"));

/// Issues exactly one upstream request per call and never retries.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, SyncError>;
}

/// Client for the public animal-protection registry.
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: Url,
    service_key: String,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    pub fn new(base_url: Url, service_key: String, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder()
            .user_agent(concat!("shelter-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::InvalidArgument(format!("http client: {err}")))?;
        Ok(Self {
            http,
            base_url: with_trailing_slash(base_url),
            service_key,
        })
    }

    pub fn from_config(cfg: &Shelter) -> Result<Self, SyncError> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|err| SyncError::InvalidArgument(format!("shelter.base_url: {err}")))?;
        Self::new(base_url, cfg.service_key.clone(), cfg.request_timeout())
    }

    pub fn build_request(&self, request: &PageRequest) -> Result<reqwest::Request, SyncError> {
        let path = match &request.resource {
            Resource::AnimalKinds { .. } => ANIMAL_KIND_PATH,
            Resource::Cities => CITY_PATH,
            Resource::Towns { .. } => TOWN_PATH,
            Resource::ShelterPosts { .. } => SHELTER_POST_PATH,
        };
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|err| SyncError::InvalidArgument(format!("registry endpoint: {err}")))?;

        let mut query: Vec<(&str, String)> = vec![
            ("serviceKey", self.service_key.clone()),
            ("_type", "json".to_string()),
            ("numOfRows", request.page_size.to_string()),
            ("pageNo", request.page_number.to_string()),
        ];
        match &request.resource {
            Resource::AnimalKinds { up_kind_code } => {
                query.push(("up_kind_cd", up_kind_code.clone()))
            }
            Resource::Cities => {}
            Resource::Towns { city_code } => query.push(("upr_cd", city_code.clone())),
            Resource::ShelterPosts { window } => {
                query.push(("bgnde", window.start_param()));
                query.push(("endde", window.end_param()));
            }
        }

        self.http
            .get(endpoint)
            .query(&query)
            .header("Accept", "application/json")
            .build()
            .map_err(SyncError::from)
    }
}

#[async_trait]
impl PageFetcher for RegistryClient {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResult, SyncError> {
        let http_request = self.build_request(request)?;
        debug!(resource = %request.resource, page = request.page_number, "fetching registry page");

        let res = self.http.execute(http_request).await?;
        let status = res.status();
        if !status.is_success() {
            warn!(resource = %request.resource, page = request.page_number, %status, "registry returned error status");
            return Err(SyncError::UpstreamUnavailable(format!(
                "registry returned HTTP {status}"
            )));
        }
        let body = res.text().await?;
        decode_page(request, &body)
    }
}

/// Decode a raw registry body into a page of entities for `request`.
pub fn decode_page(request: &PageRequest, body: &str) -> Result<PageResult, SyncError> {
    let (items, total_count) = match &request.resource {
        Resource::AnimalKinds { up_kind_code } => {
            let (rows, total) = decode_envelope::<KindItem>(body)?;
            let items = rows
                .into_iter()
                .map(|row| {
                    ReferenceEntity::AnimalKind(AnimalKind {
                        code: row.kind_cd,
                        name: row.knm,
                        animal_code: up_kind_code.clone(),
                    })
                })
                .collect();
            (items, total)
        }
        Resource::Cities => {
            let (rows, total) = decode_envelope::<SidoItem>(body)?;
            let items = rows
                .into_iter()
                .map(|row| {
                    ReferenceEntity::City(City {
                        code: row.org_cd,
                        name: row.orgdown_nm,
                    })
                })
                .collect();
            (items, total)
        }
        Resource::Towns { .. } => {
            let (rows, total) = decode_envelope::<SigunguItem>(body)?;
            let items = rows
                .into_iter()
                .map(|row| {
                    ReferenceEntity::Town(Town {
                        code: row.org_cd,
                        name: row.orgdown_nm,
                        parent_city_code: row.upr_cd,
                    })
                })
                .collect();
            (items, total)
        }
        Resource::ShelterPosts { .. } => {
            let (rows, total) = decode_envelope::<AbandonmentItem>(body)?;
            let items = rows
                .into_iter()
                .map(|row| shelter_post_from_row(row).map(ReferenceEntity::ShelterPost))
                .collect::<Result<Vec<_>, _>>()?;
            (items, total)
        }
    };

    Ok(PageResult {
        items,
        total_count,
        page_number: request.page_number,
    })
}

fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<(Vec<T>, u64), SyncError> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|err| SyncError::UpstreamMalformed(format!("envelope: {err}")))?;
    let header = envelope.response.header;
    if header.result_code != RESULT_OK {
        return Err(SyncError::UpstreamUnavailable(format!(
            "registry rejected request: {} {}",
            header.result_code, header.result_msg
        )));
    }
    let body = envelope
        .response
        .body
        .ok_or_else(|| SyncError::UpstreamMalformed("envelope has no body".into()))?;
    let total_count = body
        .total_count
        .ok_or_else(|| SyncError::UpstreamMalformed("envelope body has no totalCount".into()))?;
    Ok((body.items.into_vec(), total_count))
}

fn shelter_post_from_row(row: AbandonmentItem) -> Result<ShelterPost, SyncError> {
    if row.desertion_no.trim().is_empty() {
        return Err(SyncError::UpstreamMalformed(
            "shelter post without desertionNo".into(),
        ));
    }
    let found_date = NaiveDate::parse_from_str(row.happen_dt.trim(), REGISTRY_DATE_FORMAT)
        .map_err(|err| {
            SyncError::UpstreamMalformed(format!(
                "shelter post {}: happenDt {:?}: {err}",
                row.desertion_no, row.happen_dt
            ))
        })?;
    let (animal_name, animal_kind_name) = row
        .kind_cd
        .as_deref()
        .map(split_kind_label)
        .unwrap_or((None, None));
    let (city_name, town_name) = row
        .org_nm
        .as_deref()
        .map(split_org_name)
        .unwrap_or((None, None));

    Ok(ShelterPost {
        external_id: row.desertion_no,
        found_date,
        found_place: non_empty(row.happen_place),
        city_name,
        town_name,
        animal_name,
        animal_kind_name,
        age: non_empty(row.age),
        sex: non_empty(row.sex_cd),
        color: non_empty(row.color_cd),
        weight: non_empty(row.weight),
        notice_number: non_empty(row.notice_no),
        image_url: non_empty(row.popfile),
        status: non_empty(row.process_state),
        neutered: non_empty(row.neuter_yn),
        feature: non_empty(row.special_mark),
        shelter_name: non_empty(row.care_nm),
        shelter_telephone: non_empty(row.care_tel),
        shelter_address: non_empty(row.care_addr),
    })
}

fn split_kind_label(label: &str) -> (Option<String>, Option<String>) {
    match KIND_LABEL.captures(label) {
        Some(caps) => (
            non_empty(Some(caps["animal"].to_string())),
            non_empty(Some(caps["kind"].to_string())),
        ),
        None => (None, non_empty(Some(label.to_string()))),
    }
}

/// "서울특별시 강남구" -> ("서울특별시", "강남구"); a bare city has no town.
fn split_org_name(org: &str) -> (Option<String>, Option<String>) {
    let org = org.trim();
    match org.split_once(char::is_whitespace) {
        Some((city, town)) => (
            non_empty(Some(city.to_string())),
            non_empty(Some(town.trim().to_string())),
        ),
        None => (non_empty(Some(org.to_string())), None),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
