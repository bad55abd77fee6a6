// Tests for the Drone build trigger against a mock CI host

use common::errors::{FetchError, TriggerError};
use common::http::HttpFetcher;
use common::models::ConnectionSettings;
use common::trigger::{BuildTrigger, DroneTrigger};
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTH_KEY: &str = "secret-key";

fn drone(server: &MockServer, max_lookback: u64) -> DroneTrigger {
    let connection = ConnectionSettings {
        drone_host: server.uri(),
        auth_key: AUTH_KEY.to_string(),
        poll_interval_seconds: 300,
        max_lookback,
    };
    DroneTrigger::new(HttpFetcher::new(5).unwrap(), &connection)
}

async fn mount_build(server: &MockServer, build: &str, number: u64, branch: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/repos/octo/app/builds/{}", build)))
        .and(header("Authorization", AUTH_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "number": number,
            "branch": branch,
            "status": "success"
        })))
        .expect(hits)
        .mount(server)
        .await;
}

async fn mount_fork(server: &MockServer, number: u64, status: u16, hits: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/api/repos/octo/app/builds/{}", number)))
        .and(query_param("fork", "true"))
        .and(header("Authorization", AUTH_KEY))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "number": number + 100
        })))
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn latest_build_on_branch_is_forked_directly() {
    let server = MockServer::start().await;
    mount_build(&server, "latest", 42, "main", 1).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/repos/octo/app/builds/\d+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_fork(&server, 42, 200, 1).await;

    let number = drone(&server, 100).trigger("octo/app", "main").await.unwrap();

    assert_eq!(number, 42);
    server.verify().await;
}

#[tokio::test]
async fn previous_build_on_branch_takes_one_backward_fetch() {
    let server = MockServer::start().await;
    mount_build(&server, "latest", 42, "dev", 1).await;
    mount_build(&server, "41", 41, "main", 1).await;
    mount_fork(&server, 41, 200, 1).await;

    let number = drone(&server, 100).trigger("octo/app", "main").await.unwrap();

    assert_eq!(number, 41);
    server.verify().await;
}

#[tokio::test]
async fn backward_scan_stops_at_lookback_limit() {
    let server = MockServer::start().await;
    mount_build(&server, "latest", 10, "dev", 1).await;
    mount_build(&server, "9", 9, "dev", 1).await;
    mount_build(&server, "8", 8, "feature", 1).await;
    mount_build(&server, "7", 7, "dev", 1).await;
    mount_build(&server, "6", 6, "main", 0).await;
    mount_fork(&server, 6, 200, 0).await;

    let err = drone(&server, 3)
        .trigger("octo/app", "main")
        .await
        .unwrap_err();

    match err {
        TriggerError::BranchNotFound {
            branch,
            latest,
            scanned,
            ..
        } => {
            assert_eq!(branch, "main");
            assert_eq!(latest, 10);
            assert_eq!(scanned, 3);
        }
        other => panic!("expected BranchNotFound, got {:?}", other),
    }
    server.verify().await;
}

#[tokio::test]
async fn backward_scan_stops_at_first_build() {
    let server = MockServer::start().await;
    mount_build(&server, "latest", 3, "dev", 1).await;
    mount_build(&server, "2", 2, "dev", 1).await;
    mount_build(&server, "1", 1, "dev", 1).await;

    let err = drone(&server, 100)
        .trigger("octo/app", "main")
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::BranchNotFound { scanned: 2, .. }));
    server.verify().await;
}

#[tokio::test]
async fn rejected_fork_is_trigger_error() {
    let server = MockServer::start().await;
    mount_build(&server, "latest", 42, "main", 1).await;
    mount_fork(&server, 42, 500, 1).await;

    let err = drone(&server, 100)
        .trigger("octo/app", "main")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TriggerError::Rejected {
            number: 42,
            status: 500,
            ..
        }
    ));
}

#[tokio::test]
async fn unauthorized_latest_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/repos/octo/app/builds/latest"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;
    mount_fork(&server, 42, 200, 0).await;

    let err = drone(&server, 100)
        .trigger("octo/app", "main")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TriggerError::Fetch(FetchError::Status { status: 401, .. })
    ));
}

#[tokio::test]
async fn malformed_build_record_is_invalid_build() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/repos/octo/app/builds/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"number": "ten"})))
        .mount(&server)
        .await;

    let err = drone(&server, 100)
        .trigger("octo/app", "main")
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::InvalidBuild { .. }));
}
