//! Wire types for the registry's JSON envelope.
//!
//! ```json
//! {"response": {"header": {"resultCode": "00", "resultMsg": "NORMAL SERVICE."},
//!               "body": {"items": {"item": [..]}, "numOfRows": 100, "pageNo": 1, "totalCount": 350}}}
//! ```
use serde::Deserialize;

/// Result code the registry returns for a successful call.
pub const RESULT_OK: &str = "00";

#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub response: Response<T>,
}

#[derive(Deserialize, Debug)]
pub struct Response<T> {
    pub header: Header,
    #[serde(default = "Option::default")]
    pub body: Option<Body<T>>,
}

#[derive(Deserialize, Debug)]
pub struct Header {
    #[serde(rename = "resultCode")]
    pub result_code: String,
    #[serde(rename = "resultMsg", default)]
    pub result_msg: String,
}

#[derive(Deserialize, Debug)]
pub struct Body<T> {
    #[serde(default = "Items::default")]
    pub items: Items<T>,
    /// Absent on malformed responses; nothing can be planned without it.
    #[serde(rename = "totalCount", default)]
    pub total_count: Option<u64>,
}

/// `items` is `""` when a page has no rows.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum Items<T> {
    Wrapped {
        #[serde(default = "OneOrMany::default")]
        item: OneOrMany<T>,
    },
    Empty(String),
}

impl<T> Default for Items<T> {
    fn default() -> Self {
        Items::Empty(String::new())
    }
}

impl<T> Items<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Items::Wrapped { item } => item.into_vec(),
            Items::Empty(_) => Vec::new(),
        }
    }
}

/// A single row comes back as an object instead of a one-element array.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Row of `/kind`.
#[derive(Deserialize, Debug)]
pub struct KindItem {
    #[serde(rename = "kindCd")]
    pub kind_cd: String,
    #[serde(rename = "knm", alias = "KNm")]
    pub knm: String,
}

/// Row of `/sido`.
#[derive(Deserialize, Debug)]
pub struct SidoItem {
    #[serde(rename = "orgCd")]
    pub org_cd: String,
    #[serde(rename = "orgdownNm")]
    pub orgdown_nm: String,
}

/// Row of `/sigungu`.
#[derive(Deserialize, Debug)]
pub struct SigunguItem {
    #[serde(rename = "uprCd")]
    pub upr_cd: String,
    #[serde(rename = "orgCd")]
    pub org_cd: String,
    #[serde(rename = "orgdownNm")]
    pub orgdown_nm: String,
}

/// Row of `/abandonmentPublic`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AbandonmentItem {
    pub desertion_no: String,
    pub happen_dt: String,
    pub happen_place: Option<String>,
    pub kind_cd: Option<String>,
    pub color_cd: Option<String>,
    pub age: Option<String>,
    pub weight: Option<String>,
    pub notice_no: Option<String>,
    pub popfile: Option<String>,
    pub process_state: Option<String>,
    pub sex_cd: Option<String>,
    pub neuter_yn: Option<String>,
    pub special_mark: Option<String>,
    pub care_nm: Option<String>,
    pub care_tel: Option<String>,
    pub care_addr: Option<String>,
    pub org_nm: Option<String>,
}
