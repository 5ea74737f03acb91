//! GenerateCSR action tests

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

use certgate::services::bus::memory::DEFAULT_CSR;
use certgate::services::MemoryBus;

use crate::common::{csr_body, uris, TestApp};

#[tokio::test]
async fn test_generate_csr_returns_csr_text() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &app.admin_token())
        .await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["CSRString"], DEFAULT_CSR);
    assert_eq!(json["CertificateCollection"]["@odata.id"], uris::HTTPS);

    assert_eq!(app.bus.method_count("GenerateCSR"), 1);
    assert_eq!(app.bus.method_count("CSR"), 1);
    assert_eq!(app.bus.active_subscriptions(), 0);
    assert!(!app.state.csr.state().active);
}

#[tokio::test]
async fn test_generate_csr_fills_expected_key_usage() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::LDAP), &app.admin_token())
        .await;

    response.assert_ok();
    let call = app
        .bus
        .calls()
        .into_iter()
        .find(|c| c.method == "GenerateCSR")
        .expect("GenerateCSR call");
    assert_eq!(call.path, "/xyz/openbmc_project/certs/client/ldap");
    assert_eq!(call.args.len(), 18);
    assert_eq!(
        call.args[12].as_string_list(),
        Some(&["ClientAuthentication".to_string()][..])
    );
}

#[tokio::test]
async fn test_generate_csr_requires_configure_manager() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &app.readonly_token())
        .await;

    response.assert_forbidden();
    assert_eq!(app.bus.call_count(), 0);
    assert_eq!(app.bus.subscriptions_opened(), 0);
}

#[tokio::test]
async fn test_generate_csr_missing_field() {
    let app = TestApp::new();
    let mut body = csr_body(uris::HTTPS);
    body.as_object_mut().unwrap().remove("City");

    let response = app
        .post_json(uris::GENERATE_CSR, body, &app.admin_token())
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "PropertyMissing");
    let json: Value = response.json();
    assert_eq!(json["details"]["property"], "City");
    assert_eq!(app.bus.subscriptions_opened(), 0);
}

#[tokio::test]
async fn test_generate_csr_truststore_not_supported() {
    let app = TestApp::new();
    let response = app
        .post_json(
            uris::GENERATE_CSR,
            csr_body(uris::TRUSTSTORE),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "ActionParameterNotSupported");
    let json: Value = response.json();
    assert_eq!(json["details"]["parameter"], "CertificateCollection");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_generate_csr_rsa_key_length() {
    let app = TestApp::new();
    let mut body = csr_body(uris::HTTPS);
    body["KeyPairAlgorithm"] = "RSA".into();
    body["KeyBitLength"] = 4096.into();

    let response = app
        .post_json(uris::GENERATE_CSR, body, &app.admin_token())
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "PropertyValueNotInList");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generate_csr_busy_then_timeout() {
    let bus = MemoryBus::new();
    bus.set_csr_delay(None);
    let app = Arc::new(TestApp::with_bus(bus));
    let token = app.admin_token();

    let first = {
        let app = Arc::clone(&app);
        let token = token.clone();
        tokio::spawn(async move {
            app.post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &token)
                .await
        })
    };

    while !app.state.csr.state().active {
        tokio::task::yield_now().await;
    }

    let second = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::LDAP), &token)
        .await;
    second.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(second.message_id(), "ServiceTemporarilyUnavailable");
    assert_eq!(second.header("retry-after").as_deref(), Some("2"));
    assert_eq!(app.bus.method_count("GenerateCSR"), 1);

    let first = first.await.unwrap();
    first.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(!app.state.csr.state().active);
    assert_eq!(app.bus.active_subscriptions(), 0);

    let stats = app.state.csr.stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.rejected_busy, 1);

    // The slot is free again once the first session ends
    app.bus.set_csr_delay(Some(Duration::from_millis(100)));
    let third = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::LDAP), &token)
        .await;
    third.assert_ok();
}

#[tokio::test]
async fn test_generate_csr_call_failure() {
    let app = TestApp::new();
    app.bus.inject_fault(
        "GenerateCSR",
        Some("xyz.openbmc_project.Common.Error.InternalFailure"),
        "key generation failed",
    );

    let response = app
        .post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &app.admin_token())
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.state.csr.state().active);
    assert_eq!(app.state.csr.stats().failed, 1);
}

#[tokio::test]
async fn test_detailed_health_counts_sessions() {
    let app = TestApp::new();
    app.post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &app.admin_token())
        .await
        .assert_ok();

    let response = app.get("/health/detailed").await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["csr"]["stats"]["started"], 1);
    assert_eq!(json["csr"]["stats"]["completed"], 1);
    assert_eq!(json["csr"]["slot"]["active"], false);
}

#[tokio::test(start_paused = true)]
async fn test_detailed_health_hides_live_session() {
    let bus = MemoryBus::new();
    bus.set_csr_delay(None);
    let app = Arc::new(TestApp::with_bus(bus));

    let pending = {
        let app = Arc::clone(&app);
        let token = app.admin_token();
        tokio::spawn(async move {
            app.post_json(uris::GENERATE_CSR, csr_body(uris::HTTPS), &token)
                .await
        })
    };

    while !app.state.csr.state().active {
        tokio::task::yield_now().await;
    }

    let response = app.get("/health/detailed").await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["csr"]["slot"]["active"], true);
    assert!(json["csr"]["slot"].get("session").is_none());
    assert!(!response.text().contains("ServerTransport"));

    pending
        .await
        .unwrap()
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
