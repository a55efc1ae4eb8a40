//! Full lookup against the mock PPSR site with a real Chrome.
//!
//! Run with `cargo test -p ppsr-server -- --ignored` on a machine with
//! Chrome or Chromium installed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use ppsr_browser::ChromeLauncher;
use ppsr_harness::MockPpsrSite;
use ppsr_runner::{NoDelay, Runner, SiteProfile};
use ppsr_server::{router, AppState};
use ppsr_types::{BrowserConfig, ServiceConfig};

#[tokio::test]
#[ignore = "needs a local Chrome"]
async fn lookup_against_mock_site() {
    let site = MockPpsrSite::start("XYZ789").await.expect("should start site");
    let logs = tempfile::tempdir().expect("should create temp dir");
    let config = Arc::new(ServiceConfig {
        log_dir: logs.path().to_path_buf(),
        target_url: site.login_url(),
        browser: BrowserConfig {
            headless: true,
            slow_mo_ms: 0,
            network_latency_ms: 0,
            ..BrowserConfig::default()
        },
        ..ServiceConfig::default()
    });
    let runner = Runner::new(
        Arc::new(ChromeLauncher),
        Arc::new(NoDelay),
        SiteProfile::with_target_url(site.login_url()),
    );
    let app = router(Arc::new(AppState::new(config, runner)));

    let response = app
        .oneshot(
            Request::post("/open_ppsr")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"username":"u","password":"p","vin_number":"1HGCM82633A123456"}"#,
                ))
                .unwrap(),
        )
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["plateNumber"], "XYZ789", "{body}");
    assert_eq!(site.searches(), vec!["1HGCM82633A123456".to_string()]);
}
