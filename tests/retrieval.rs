use chrono::{TimeZone, Utc};
use dataspace_down::auth::{Credentials, TokenProvider, DEFAULT_CLIENT_ID};
use dataspace_down::catalog::CatalogClient;
use dataspace_down::driver::{
    ItemStatus, Mode, RetrievalDriver, RetrievalRequest, RunReport, State,
};
use dataspace_down::fetcher::HttpFetcher;
use dataspace_down::filter::{GeoPoint, SearchParams};
use dataspace_down::ErrorKind;
use httpmock::prelude::*;
use serde_json::json;

fn sentinel2_params() -> SearchParams {
    SearchParams {
        collection: "SENTINEL-2".to_string(),
        product_type: String::new(),
        start_date: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
        end_date: Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap(),
        point: GeoPoint::new(43.7819, 11.2876),
        max_cloud_cover: 10.0,
    }
}

fn http_driver(server: &MockServer) -> RetrievalDriver<HttpFetcher> {
    let client = reqwest::Client::new();
    RetrievalDriver::new(
        CatalogClient::new(client.clone(), &server.url("/odata/v1")),
        TokenProvider::new(client, &server.url("/token"), DEFAULT_CLIENT_ID),
        HttpFetcher::new().unwrap(),
    )
}

#[tokio::test]
async fn downloads_every_product_except_the_broken_one() {
    let server = MockServer::start_async().await;
    let search = server.mock(|when, then| {
        when.method(GET)
            .path("/odata/v1/Products")
            .query_param_exists("$filter");
        then.status(200).json_body(json!({
            "@odata.context": "$metadata#Products",
            "value": [
                {"Id": "p1", "Name": "S2A_one.SAFE", "ContentLength": 5, "Online": true},
                {"Id": "p2", "Name": "S2A_two.SAFE", "ContentLength": "5", "Online": false},
                {"Id": "p3", "Name": "S2A_three.SAFE", "Checksum": []}
            ]
        }));
    });
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/token")
            .form_urlencoded_tuple("grant_type", "password");
        then.status(200).json_body(json!({"access_token": "abc123", "expires_in": 600}));
    });
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/odata/v1/Products(p1)/$value")
            .header("authorization", "Bearer abc123");
        then.status(200).body("one");
    });
    let broken = server.mock(|when, then| {
        when.method(GET).path("/odata/v1/Products(p2)/$value");
        then.status(500);
    });
    let third = server.mock(|when, then| {
        when.method(GET)
            .path("/odata/v1/Products(p3)/$value")
            .header("authorization", "Bearer abc123");
        then.status(200).body("three");
    });

    let dir = tempfile::tempdir().unwrap();
    let report = http_driver(&server)
        .run(RetrievalRequest {
            params: sentinel2_params(),
            top: None,
            mode: Mode::Fetch {
                credentials: Credentials::new("user", "pass"),
                dest_dir: dir.path().to_path_buf(),
            },
        })
        .await
        .unwrap();

    search.assert();
    token.assert();
    first.assert();
    broken.assert();
    third.assert();

    assert_eq!(report.state(), Some(State::Done));
    assert_eq!(report.failures(), 1);
    assert_eq!(report.items[0].status, ItemStatus::Downloaded { bytes: 3 });
    assert!(matches!(report.items[1].status, ItemStatus::Failed { .. }));
    assert_eq!(report.items[2].status, ItemStatus::Downloaded { bytes: 5 });
    assert!(report.filter.contains("Value le 10"));

    assert_eq!(
        std::fs::read_to_string(dir.path().join("S2A_one.SAFE.zip")).unwrap(),
        "one"
    );
    assert!(!dir.path().join("S2A_two.SAFE.zip").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("S2A_three.SAFE.zip")).unwrap(),
        "three"
    );

    let path = dir.path().join("report.json");
    report.write(&path).unwrap();
    assert_eq!(RunReport::read(&path).unwrap(), report);
}

#[tokio::test]
async fn rejected_login_downloads_nothing() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/odata/v1/Products");
        then.status(200)
            .json_body(json!({"value": [{"Id": "p1", "Name": "S2A_one.SAFE"}]}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(401).json_body(json!({"error": "invalid_grant"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/odata/v1/Products(p1)/$value");
        then.status(200).body("one");
    });

    let dir = tempfile::tempdir().unwrap();
    let err = http_driver(&server)
        .run(RetrievalRequest {
            params: sentinel2_params(),
            top: Some(1),
            mode: Mode::Fetch {
                credentials: Credentials::new("user", "wrong"),
                dest_dir: dir.path().to_path_buf(),
            },
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert!(!dir.path().join("S2A_one.SAFE.zip").exists());
}
