use reqwest::Url;
use serde_json::json;
use shelter_sync::error::SyncError;
use shelter_sync::model::{PageRequest, ReferenceEntity, Resource, SyncWindow};
use shelter_sync::shelter::{PageFetcher, RegistryClient};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "s3cr3t-service-key";

fn client(server: &MockServer, timeout: Duration) -> RegistryClient {
    let base = Url::parse(&format!("{}/abandonmentPublicSrvc", server.uri())).unwrap();
    RegistryClient::new(base, KEY.into(), timeout).unwrap()
}

fn posts_request(page: u32) -> PageRequest {
    let window = SyncWindow::parse("20231105").unwrap();
    PageRequest::new(Resource::ShelterPosts { window }, page, 2)
}

fn envelope(items: serde_json::Value, total: u64) -> serde_json::Value {
    json!({
        "response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL SERVICE."},
            "body": {"items": items, "numOfRows": 2, "pageNo": 1, "totalCount": total}
        }
    })
}

#[tokio::test]
async fn fetches_and_decodes_shelter_posts() {
    let server = MockServer::start().await;
    let body = envelope(
        json!({"item": [
            {"desertionNo": "448548202300123", "happenDt": "20231105", "happenPlace": "역삼동 공원",
             "kindCd": "[개] 믹스견", "sexCd": "M", "processState": "보호중",
             "orgNm": "서울특별시 강남구", "careNm": "강남 보호소"},
            {"desertionNo": "448548202300124", "happenDt": "20231105", "kindCd": "[고양이] 코리안숏헤어",
             "orgNm": "부산광역시"}
        ]}),
        3,
    );
    Mock::given(method("GET"))
        .and(path("/abandonmentPublicSrvc/abandonmentPublic"))
        .and(query_param("serviceKey", KEY))
        .and(query_param("_type", "json"))
        .and(query_param("pageNo", "1"))
        .and(query_param("numOfRows", "2"))
        .and(query_param("bgnde", "20231105"))
        .and(query_param("endde", "20231105"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server, Duration::from_secs(5))
        .fetch(&posts_request(1))
        .await
        .unwrap();

    assert_eq!(page.total_count, 3);
    assert_eq!(page.page_number, 1);
    assert_eq!(page.items.len(), 2);
    let ReferenceEntity::ShelterPost(first) = &page.items[0] else {
        panic!("expected shelter post, got {:?}", page.items[0]);
    };
    assert_eq!(first.external_id, "448548202300123");
    assert_eq!(first.animal_name.as_deref(), Some("개"));
    assert_eq!(first.animal_kind_name.as_deref(), Some("믹스견"));
    assert_eq!(first.city_name.as_deref(), Some("서울특별시"));
    assert_eq!(first.town_name.as_deref(), Some("강남구"));
    let ReferenceEntity::ShelterPost(second) = &page.items[1] else {
        panic!("expected shelter post");
    };
    assert_eq!(second.city_name.as_deref(), Some("부산광역시"));
    assert!(second.town_name.is_none());
}

#[tokio::test]
async fn town_requests_carry_parent_city_code() {
    let server = MockServer::start().await;
    let body = envelope(
        json!({"item": {"uprCd": "6110000", "orgCd": "3220000", "orgdownNm": "강남구"}}),
        1,
    );
    Mock::given(method("GET"))
        .and(path("/abandonmentPublicSrvc/sigungu"))
        .and(query_param("upr_cd", "6110000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let request = PageRequest::new(Resource::Towns { city_code: "6110000".into() }, 1, 100);
    let page = client(&server, Duration::from_secs(5)).fetch(&request).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].business_code(), "3220000");
}

#[tokio::test]
async fn http_error_status_is_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .fetch(&posts_request(2))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UpstreamUnavailable(_)), "{err:?}");
    assert!(err.is_page_isolated());
    assert!(!err.to_string().contains(KEY));
}

#[tokio::test]
async fn rejection_code_is_upstream_unavailable() {
    let server = MockServer::start().await;
    let body = json!({"response": {"header": {"resultCode": "30", "resultMsg": "SERVICE KEY IS NOT REGISTERED ERROR."}}});
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .fetch(&posts_request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UpstreamUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn undecodable_body_is_upstream_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<OpenAPI_ServiceResponse/>"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .fetch(&posts_request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UpstreamMalformed(_)), "{err:?}");
}

#[tokio::test]
async fn timeout_error_does_not_leak_the_service_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!(""), 0))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(200))
        .fetch(&posts_request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UpstreamUnavailable(_)), "{err:?}");
    assert!(!err.to_string().contains(KEY), "{err}");
    assert!(!format!("{err:?}").contains(KEY));
}
