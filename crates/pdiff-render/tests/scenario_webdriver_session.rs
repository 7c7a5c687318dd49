//! Scenario: WebDriver renderer against a mock driver.
//!
//! # Invariants under test
//!
//! 1. `connect` opens exactly one session and the session id is reused for
//!    every navigation and script call.
//! 2. A readiness condition that never holds ends in `RenderError::Timeout`,
//!    including when the page script throws while polling.
//! 3. Extraction results decode into `RawPage`.
//! 4. Driver-side errors surface as `RenderError::WebDriver`.
//! 5. `close` deletes the session once; a second `close` sends nothing.
//!
//! No browser required; the driver is an in-process `httpmock` server.

use std::time::Duration;

use httpmock::prelude::*;
use pdiff_render::{
    Browser, ExtractionSpec, PageRenderer, ReadyCondition, RenderError, TableSelector,
    WebDriverConfig, WebDriverRenderer,
};
use serde_json::json;

fn cfg(server: &MockServer) -> WebDriverConfig {
    WebDriverConfig {
        endpoint: server.base_url(),
        browser: Browser::Chrome,
        show: false,
        poll_interval: Duration::from_millis(5),
        page_load_timeout: Duration::from_secs(5),
    }
}

async fn mock_new_session(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session")
                .body_contains("--headless=new");
            then.status(200)
                .json_body(json!({ "value": { "sessionId": "abc", "capabilities": {} } }));
        })
        .await
}

fn spec() -> ExtractionSpec {
    ExtractionSpec::from_template(
        &["owner-name".to_string()],
        r#"[data-hook="{key}"]"#,
        TableSelector {
            container: r#"[data-hook="valuation"]"#.to_string(),
            value_child: Some(1),
        },
    )
}

#[tokio::test]
async fn scenario_navigate_wait_extract_close() {
    let server = MockServer::start_async().await;
    let new_session = mock_new_session(&server).await;

    let navigate = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session/abc/url")
                .body_contains("property.example/?p=100");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let ready = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session/abc/execute/sync")
                .body_contains("querySelector(arguments[0]) !== null");
            then.status(200).json_body(json!({ "value": true }));
        })
        .await;

    let extract = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/session/abc/execute/sync")
                .body_contains("spec.table.container");
            then.status(200).json_body(json!({
                "value": {
                    "fields": { "owner-name": "A SMITH" },
                    "rows": [["2021", "$1,200"]]
                }
            }));
        })
        .await;

    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/abc");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let mut r = WebDriverRenderer::connect(&cfg(&server)).await.unwrap();
    assert_eq!(r.session_id(), Some("abc"));

    r.navigate("http://property.example/?p=100").await.unwrap();
    r.wait_until(
        &ReadyCondition::Selector(r#"[data-hook="valuation"]"#.to_string()),
        Duration::from_millis(200),
    )
    .await
    .unwrap();
    let page = r.extract_structured(&spec()).await.unwrap();

    assert_eq!(page.fields["owner-name"].as_deref(), Some("A SMITH"));
    assert_eq!(page.rows.as_ref().unwrap()[0][1].as_deref(), Some("$1,200"));

    r.close().await.unwrap();
    r.close().await.unwrap();

    new_session.assert_async().await;
    navigate.assert_async().await;
    ready.assert_async().await;
    extract.assert_async().await;
    assert_eq!(delete.hits_async().await, 1);
    assert_eq!(r.session_id(), None);
}

#[tokio::test]
async fn scenario_never_ready_times_out() {
    let server = MockServer::start_async().await;
    mock_new_session(&server).await;

    let polls = server
        .mock_async(|when, then| {
            when.method(POST).path("/session/abc/execute/sync");
            then.status(200).json_body(json!({ "value": false }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/abc");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let mut r = WebDriverRenderer::connect(&cfg(&server)).await.unwrap();
    let err = r
        .wait_until(
            &ReadyCondition::Script("history.state.opa".to_string()),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::Timeout { .. }), "got {err:?}");
    assert!(polls.hits_async().await >= 2, "readiness must be polled");
    r.close().await.unwrap();
}

#[tokio::test]
async fn scenario_script_errors_while_polling_count_as_not_ready() {
    let server = MockServer::start_async().await;
    mock_new_session(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/session/abc/execute/sync");
            then.status(500).json_body(json!({
                "value": { "error": "javascript error", "message": "history.state is null" }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/abc");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let mut r = WebDriverRenderer::connect(&cfg(&server)).await.unwrap();
    let err = r
        .wait_until(
            &ReadyCondition::Script("history.state.sa".to_string()),
            Duration::from_millis(30),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RenderError::Timeout { .. }), "got {err:?}");
    r.close().await.unwrap();
}

#[tokio::test]
async fn scenario_navigation_error_surfaces_driver_error() {
    let server = MockServer::start_async().await;
    mock_new_session(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/session/abc/url");
            then.status(500).json_body(json!({
                "value": { "error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED" }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/abc");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let mut r = WebDriverRenderer::connect(&cfg(&server)).await.unwrap();
    let err = r.navigate("http://nowhere.invalid/").await.unwrap_err();

    assert_eq!(
        err,
        RenderError::WebDriver {
            error: "unknown error".to_string(),
            message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        }
    );
    r.close().await.unwrap();
}

#[tokio::test]
async fn scenario_calls_after_close_are_rejected() {
    let server = MockServer::start_async().await;
    mock_new_session(&server).await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/session/abc");
            then.status(200).json_body(json!({ "value": null }));
        })
        .await;

    let mut r = WebDriverRenderer::connect(&cfg(&server)).await.unwrap();
    r.close().await.unwrap();

    assert_eq!(
        r.navigate("http://property.example/").await.unwrap_err(),
        RenderError::Closed
    );
}
