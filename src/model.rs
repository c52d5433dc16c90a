use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncError;

/// Date format used by the registry for windows and found dates.
pub const REGISTRY_DATE_FORMAT: &str = "%Y%m%d";

/// Single logical date scoping one shelter-post sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyncWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The day before `today`, the window used by the scheduled run.
    pub fn yesterday(today: NaiveDate) -> Self {
        let date = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        Self::for_date(date)
    }

    /// Parse a `yyyyMMdd` date into a one-day window.
    pub fn parse(value: &str) -> Result<Self, SyncError> {
        NaiveDate::parse_from_str(value.trim(), REGISTRY_DATE_FORMAT)
            .map(Self::for_date)
            .map_err(|err| SyncError::InvalidArgument(format!("window date {value:?}: {err}")))
    }

    pub fn start_param(&self) -> String {
        self.start.format(REGISTRY_DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(REGISTRY_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start_param())
        } else {
            write!(f, "{}-{}", self.start_param(), self.end_param())
        }
    }
}

/// What a page request addresses on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Breeds below one top-level animal code (e.g. 417000 for dogs).
    AnimalKinds { up_kind_code: String },
    Cities,
    Towns { city_code: String },
    ShelterPosts { window: SyncWindow },
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::AnimalKinds { .. } => ResourceKind::AnimalKind,
            Resource::Cities => ResourceKind::City,
            Resource::Towns { .. } => ResourceKind::Town,
            Resource::ShelterPosts { .. } => ResourceKind::ShelterPost,
        }
    }

    /// Parent code or window that scopes the resource, if any.
    pub fn scope(&self) -> Option<String> {
        match self {
            Resource::AnimalKinds { up_kind_code } => Some(up_kind_code.clone()),
            Resource::Cities => None,
            Resource::Towns { city_code } => Some(city_code.clone()),
            Resource::ShelterPosts { window } => Some(window.to_string()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope() {
            Some(scope) => write!(f, "{}({})", self.kind().as_str(), scope),
            None => f.write_str(self.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AnimalKind,
    City,
    Town,
    ShelterPost,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AnimalKind => "animal_kind",
            ResourceKind::City => "city",
            ResourceKind::Town => "town",
            ResourceKind::ShelterPost => "shelter_post",
        }
    }
}

/// One bounded slice of upstream results. Equal requests are safe to repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub resource: Resource,
    /// 1-based.
    pub page_number: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(resource: Resource, page_number: u32, page_size: u32) -> Self {
        Self {
            resource,
            page_number,
            page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub items: Vec<ReferenceEntity>,
    /// Only meaningful on page 1.
    pub total_count: u64,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub code: String,
    pub name: String,
    pub parent_city_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimalKind {
    pub code: String,
    pub name: String,
    /// Top-level animal code this breed belongs to.
    pub animal_code: String,
}

/// A found-animal notice published by a shelter. City, town and breed are
/// denormalised names; the sink resolves them to business codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelterPost {
    pub external_id: String,
    pub found_date: NaiveDate,
    pub found_place: Option<String>,
    pub city_name: Option<String>,
    pub town_name: Option<String>,
    pub animal_name: Option<String>,
    pub animal_kind_name: Option<String>,
    pub age: Option<String>,
    pub sex: Option<String>,
    pub color: Option<String>,
    pub weight: Option<String>,
    pub notice_number: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<String>,
    pub neutered: Option<String>,
    pub feature: Option<String>,
    pub shelter_name: Option<String>,
    pub shelter_telephone: Option<String>,
    pub shelter_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceEntity {
    City(City),
    Town(Town),
    AnimalKind(AnimalKind),
    ShelterPost(ShelterPost),
}

impl ReferenceEntity {
    /// Natural key used as the upsert identity.
    pub fn business_code(&self) -> &str {
        match self {
            ReferenceEntity::City(city) => &city.code,
            ReferenceEntity::Town(town) => &town.code,
            ReferenceEntity::AnimalKind(kind) => &kind.code,
            ReferenceEntity::ShelterPost(post) => &post.external_id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ReferenceEntity::City(_) => ResourceKind::City,
            ReferenceEntity::Town(_) => ResourceKind::Town,
            ReferenceEntity::AnimalKind(_) => ResourceKind::AnimalKind,
            ReferenceEntity::ShelterPost(_) => ResourceKind::ShelterPost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yesterday_window_is_single_day() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let window = SyncWindow::yesterday(today);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(window.start, window.end);
        assert_eq!(window.start_param(), "20240229");
        assert_eq!(window.to_string(), "20240229");
    }

    #[test]
    fn parse_window_rejects_garbage() {
        assert_eq!(
            SyncWindow::parse("20231105").unwrap().end_param(),
            "20231105"
        );
        assert!(matches!(
            SyncWindow::parse("2023-11-05"),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn resource_display_includes_scope() {
        let window = SyncWindow::parse("20231105").unwrap();
        assert_eq!(
            Resource::ShelterPosts { window }.to_string(),
            "shelter_post(20231105)"
        );
        assert_eq!(Resource::Cities.to_string(), "city");
        assert_eq!(
            Resource::Towns {
                city_code: "6110000".into()
            }
            .to_string(),
            "town(6110000)"
        );
    }
}
