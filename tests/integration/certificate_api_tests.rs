//! Certificate collection, item and ReplaceCertificate tests

use axum::http::StatusCode;
use serde_json::{json, Value};

use certgate::services::bus::memory::{DEFAULT_ISSUER, DEFAULT_SUBJECT};
use certgate::services::bus::{BusValue, InterfaceMap, PropertyMap};
use certgate::services::certs::paths::CERTIFICATE_INTERFACE;
use certgate::services::{CertificateDomain, MemoryBus};

use crate::common::{
    install_body, replace_body, uris, TestApp, NOT_A_CERTIFICATE, REPLACEMENT_PEM, TEST_PEM,
};

fn seeded(domain: CertificateDomain, ids: &[&str]) -> TestApp {
    let bus = MemoryBus::new();
    for id in ids {
        bus.insert_certificate(domain, id, TEST_PEM);
    }
    TestApp::with_bus(bus)
}

fn member_ids(json: &Value) -> Vec<String> {
    json["Members"]
        .as_array()
        .expect("Members array")
        .iter()
        .map(|m| m["@odata.id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new();
    let response = app.get("/health").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_reports_bus_and_csr() {
    let app = TestApp::new();
    let response = app.get("/health/detailed").await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["components"]["bus"]["status"], "healthy");
    assert_eq!(json["csr"]["slot"]["active"], false);
    assert_eq!(json["csr"]["stats"]["started"], 0);
}

#[tokio::test]
async fn test_detailed_health_unhealthy_when_bus_fails() {
    let app = TestApp::new();
    app.bus
        .inject_fault("GetSubTreePaths", None, "connection reset");

    let response = app.get("/health/detailed").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["components"]["bus"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_collection_requires_authentication() {
    let app = TestApp::new();
    let response = app.get(uris::HTTPS).await;

    response.assert_unauthorized();
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = TestApp::new();
    let response = app.get_auth(uris::LDAP, "not-a-token").await;

    response.assert_unauthorized();
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_collection_requires_configure_manager() {
    let app = seeded(CertificateDomain::DirectoryClient, &["1"]);
    let response = app.get_auth(uris::LDAP, &app.readonly_token()).await;

    response.assert_forbidden();
    assert_eq!(response.message_id(), "InsufficientPrivilege");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_install_without_privilege_touches_nothing() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::TRUSTSTORE, install_body(TEST_PEM), &app.readonly_token())
        .await;

    response.assert_forbidden();
    assert_eq!(app.bus.call_count(), 0);
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_service_root_hides_locations_without_configure_manager() {
    let app = TestApp::new();

    let response = app
        .get_auth(uris::CERTIFICATE_SERVICE, &app.readonly_token())
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["Id"], "CertificateService");
    assert!(json.get("CertificateLocations").is_none());
    assert_eq!(
        json["Actions"]["#CertificateService.ReplaceCertificate"]["target"],
        uris::REPLACE_CERTIFICATE
    );
    assert_eq!(
        json["Actions"]["#CertificateService.ReplaceCertificate"]
            ["CertificateType@Redfish.AllowableValues"],
        json!(["PEM"])
    );
    assert_eq!(
        json["Actions"]["#CertificateService.GenerateCSR"]["target"],
        uris::GENERATE_CSR
    );

    let response = app
        .get_auth(uris::CERTIFICATE_SERVICE, &app.admin_token())
        .await;
    let json: Value = response.json();
    assert_eq!(
        json["CertificateLocations"]["@odata.id"],
        uris::CERTIFICATE_LOCATIONS
    );
}

#[tokio::test]
async fn test_service_root_requires_login() {
    let app = TestApp::new();
    let response = app
        .get_auth(uris::CERTIFICATE_SERVICE, &app.token(&[]))
        .await;

    response.assert_forbidden();
}

#[tokio::test]
async fn test_empty_collection() {
    let app = TestApp::new();
    let response = app.get_auth(uris::TRUSTSTORE, &app.admin_token()).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["@odata.id"], uris::TRUSTSTORE);
    assert_eq!(json["@odata.type"], "#CertificateCollection.CertificateCollection");
    assert_eq!(json["Name"], "TrustStore Certificates Collection");
    assert_eq!(json["Members@odata.count"], 0);
    assert!(member_ids(&json).is_empty());
}

#[tokio::test]
async fn test_collection_lists_only_its_domain() {
    let bus = MemoryBus::new();
    bus.insert_certificate(CertificateDomain::DirectoryClient, "1", TEST_PEM);
    bus.insert_certificate(CertificateDomain::DirectoryClient, "2", TEST_PEM);
    bus.insert_certificate(CertificateDomain::ServerTransport, "1", TEST_PEM);
    let app = TestApp::with_bus(bus);

    let response = app.get_auth(uris::LDAP, &app.admin_token()).await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["Members@odata.count"], 2);
    let mut members = member_ids(&json);
    members.sort();
    assert_eq!(
        members,
        vec![uris::item(uris::LDAP, "1"), uris::item(uris::LDAP, "2")]
    );
}

#[tokio::test]
async fn test_certificate_locations_skip_unknown_managers() {
    let bus = MemoryBus::new();
    bus.insert_certificate(CertificateDomain::ServerTransport, "1", TEST_PEM);
    bus.insert_certificate(CertificateDomain::TrustStoreAuthority, "3", TEST_PEM);

    let mut interfaces = InterfaceMap::new();
    interfaces.insert(CERTIFICATE_INTERFACE.to_string(), PropertyMap::new());
    bus.insert_object(
        "/xyz/openbmc_project/certs/client/radius/1",
        "xyz.openbmc_project.Certs.Manager.Client.Radius",
        interfaces,
    );
    let app = TestApp::with_bus(bus);

    let response = app
        .get_auth(uris::CERTIFICATE_LOCATIONS, &app.admin_token())
        .await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["Links"]["Certificates@odata.count"], 2);
    let mut links: Vec<String> = json["Links"]["Certificates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["@odata.id"].as_str().unwrap().to_string())
        .collect();
    links.sort();
    assert_eq!(
        links,
        vec![uris::item(uris::HTTPS, "1"), uris::item(uris::TRUSTSTORE, "3")]
    );
}

#[tokio::test]
async fn test_enumeration_failure_is_internal_error() {
    let app = TestApp::new();
    app.bus
        .inject_fault("GetSubTreePaths", Some("org.freedesktop.DBus.Error.NoReply"), "timeout");

    let response = app.get_auth(uris::LDAP, &app.admin_token()).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.message_id(), "InternalError");
    assert!(!response.text().contains("timeout"));
}

#[tokio::test]
async fn test_get_certificate_projects_properties() {
    let app = seeded(CertificateDomain::DirectoryClient, &["1"]);
    let uri = uris::item(uris::LDAP, "1");

    let response = app.get_auth(&uri, &app.admin_token()).await;

    response.assert_ok();
    assert_eq!(response.header("location").as_deref(), Some(uri.as_str()));

    let json: Value = response.json();
    assert_eq!(json["@odata.id"], uri);
    assert_eq!(json["@odata.type"], "#Certificate.v1_0_0.Certificate");
    assert_eq!(json["Id"], "1");
    assert_eq!(json["Name"], "LDAP Certificate");
    assert_eq!(json["Description"], "LDAP Certificate");
    assert_eq!(json["CertificateString"], TEST_PEM);
    assert_eq!(
        json["KeyUsage"],
        json!(["DigitalSignature", "ClientAuthentication"])
    );
    assert_eq!(json["Issuer"]["CommonName"], "OpenBMC Test CA");
    assert_eq!(json["Subject"]["CommonName"], "bmc.local");
    assert_eq!(json["Subject"]["Country"], "US");
    assert_eq!(json["ValidNotBefore"], "2024-01-01T00:00:00+00:00");
    assert!(DEFAULT_ISSUER.contains("OpenBMC Test CA"));
    assert!(DEFAULT_SUBJECT.contains("bmc.local"));
}

#[tokio::test]
async fn test_get_certificate_omits_missing_properties() {
    let bus = MemoryBus::new();
    let path = bus.insert_certificate(CertificateDomain::TrustStoreAuthority, "1", TEST_PEM);
    bus.remove_property(&path, CERTIFICATE_INTERFACE, "Issuer");
    bus.remove_property(&path, CERTIFICATE_INTERFACE, "ValidNotAfter");
    let app = TestApp::with_bus(bus);

    let response = app
        .get_auth(&uris::item(uris::TRUSTSTORE, "1"), &app.admin_token())
        .await;

    response.assert_ok();
    let json: Value = response.json();
    assert!(json.get("Issuer").is_none());
    assert!(json.get("ValidNotAfter").is_none());
    assert!(json.get("Subject").is_some());
}

#[tokio::test]
async fn test_get_certificate_with_mistyped_property_fails() {
    let bus = MemoryBus::new();
    let path = bus.insert_certificate(CertificateDomain::TrustStoreAuthority, "1", TEST_PEM);
    bus.set_property(&path, CERTIFICATE_INTERFACE, "ValidNotAfter", BusValue::from("soon"));
    let app = TestApp::with_bus(bus);

    let response = app
        .get_auth(&uris::item(uris::TRUSTSTORE, "1"), &app.admin_token())
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_get_missing_certificate() {
    let app = TestApp::new();
    let response = app
        .get_auth(&uris::item(uris::HTTPS, "7"), &app.admin_token())
        .await;

    response.assert_not_found();
    assert_eq!(response.message_id(), "ResourceNotFound");
}

#[tokio::test]
async fn test_get_invalid_id_skips_bus() {
    let app = TestApp::new();
    let response = app
        .get_auth(&uris::item(uris::LDAP, "a-b"), &app.admin_token())
        .await;

    response.assert_not_found();
    assert_eq!(app.bus.method_count("GetAll"), 0);
}

#[tokio::test]
async fn test_unknown_manager_not_found() {
    let app = seeded(CertificateDomain::TrustStoreAuthority, &["1"]);
    let response = app
        .get_auth(
            "/redfish/v1/Managers/other/Truststore/Certificates",
            &app.admin_token(),
        )
        .await;

    response.assert_not_found();
    let json: Value = response.json();
    assert_eq!(json["details"]["resource_type"], "Manager");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_install_json_body() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::TRUSTSTORE, install_body(TEST_PEM), &app.admin_token())
        .await;

    response.assert_ok();
    let location = uris::item(uris::TRUSTSTORE, "1");
    assert_eq!(response.header("location").as_deref(), Some(location.as_str()));

    let json: Value = response.json();
    assert_eq!(json["Id"], "1");
    assert_eq!(json["CertificateString"], TEST_PEM);
    assert_eq!(
        app.bus
            .certificate_text("/xyz/openbmc_project/certs/authority/truststore/1")
            .as_deref(),
        Some(TEST_PEM)
    );
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_install_raw_body() {
    let app = TestApp::new();
    let response = app
        .post_text(uris::LDAP, TEST_PEM, &app.admin_token())
        .await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["@odata.id"], uris::item(uris::LDAP, "1"));
    assert_eq!(json["CertificateString"], TEST_PEM);
}

#[tokio::test]
async fn test_install_assigns_next_id() {
    let app = seeded(CertificateDomain::ServerTransport, &["1"]);
    let response = app
        .post_json(uris::HTTPS, install_body(TEST_PEM), &app.admin_token())
        .await;

    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["Id"], "2");
    assert_eq!(json["Name"], "HTTPS Certificate");
}

#[tokio::test]
async fn test_install_rejected_certificate() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::LDAP, install_body(NOT_A_CERTIFICATE), &app.admin_token())
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "PropertyValueIncorrect");
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_install_unsupported_type_touches_nothing() {
    let app = TestApp::new();
    let response = app
        .post_json(
            uris::LDAP,
            json!({ "CertificateString": TEST_PEM, "CertificateType": "DER" }),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "PropertyValueNotInList");
    assert_eq!(app.bus.call_count(), 0);
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_install_empty_certificate() {
    let app = TestApp::new();
    let response = app
        .post_json(uris::LDAP, install_body(""), &app.admin_token())
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "UnrecognizedRequestBody");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_replace_certificate() {
    let app = seeded(CertificateDomain::ServerTransport, &["1"]);
    let uri = uris::item(uris::HTTPS, "1");

    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            replace_body(&uri, REPLACEMENT_PEM),
            &app.admin_token(),
        )
        .await;

    response.assert_ok();
    assert_eq!(response.header("location").as_deref(), Some(uri.as_str()));
    let json: Value = response.json();
    assert_eq!(json["CertificateString"], REPLACEMENT_PEM);
    assert_eq!(
        app.bus
            .certificate_text("/xyz/openbmc_project/certs/server/https/1")
            .as_deref(),
        Some(REPLACEMENT_PEM)
    );
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_replace_reports_first_missing_property() {
    let app = TestApp::new();

    let response = app
        .post_json(uris::REPLACE_CERTIFICATE, json!({}), &app.admin_token())
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert_eq!(json["details"]["property"], "CertificateString");

    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            json!({ "CertificateString": TEST_PEM }),
            &app.admin_token(),
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert_eq!(json["details"]["property"], "CertificateUri");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_replace_rejects_unsupported_type() {
    let app = seeded(CertificateDomain::ServerTransport, &["1"]);
    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            json!({
                "CertificateString": TEST_PEM,
                "CertificateType": "DER",
                "CertificateUri": { "@odata.id": uris::item(uris::HTTPS, "1") }
            }),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "ActionParameterNotSupported");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_replace_malformed_uri() {
    let app = TestApp::new();
    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            replace_body("Certificates/1", TEST_PEM),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "ActionParameterValueFormatError");
}

#[tokio::test]
async fn test_replace_unmanaged_uri() {
    let app = TestApp::new();
    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            replace_body("/redfish/v1/Systems/system/Certificates/1", TEST_PEM),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "ActionParameterNotSupported");
    let json: Value = response.json();
    assert_eq!(json["details"]["parameter"], "CertificateUri");
    assert_eq!(app.bus.call_count(), 0);
}

#[tokio::test]
async fn test_replace_missing_certificate() {
    let app = TestApp::new();
    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            replace_body(&uris::item(uris::LDAP, "9"), TEST_PEM),
            &app.admin_token(),
        )
        .await;

    response.assert_not_found();
    assert_eq!(app.staged_entries(), 0);
}

#[tokio::test]
async fn test_replace_rejected_certificate() {
    let app = seeded(CertificateDomain::DirectoryClient, &["1"]);
    let response = app
        .post_json(
            uris::REPLACE_CERTIFICATE,
            replace_body(&uris::item(uris::LDAP, "1"), NOT_A_CERTIFICATE),
            &app.admin_token(),
        )
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "PropertyValueIncorrect");
    assert_eq!(
        app.bus
            .certificate_text("/xyz/openbmc_project/certs/client/ldap/1")
            .as_deref(),
        Some(TEST_PEM)
    );
}

#[tokio::test]
async fn test_replace_unparsable_body() {
    let app = TestApp::new();
    let response = app
        .post_text(uris::REPLACE_CERTIFICATE, "{not json", &app.admin_token())
        .await;

    response.assert_bad_request();
    assert_eq!(response.message_id(), "UnrecognizedRequestBody");
}

#[tokio::test]
async fn test_delete_certificate() {
    let app = seeded(CertificateDomain::DirectoryClient, &["1"]);
    let uri = uris::item(uris::LDAP, "1");

    let response = app.delete(&uri, &app.admin_token()).await;
    response.assert_status(StatusCode::NO_CONTENT);
    assert!(!app
        .bus
        .object_exists("/xyz/openbmc_project/certs/client/ldap/1"));

    let response = app.get_auth(&uri, &app.admin_token()).await;
    response.assert_not_found();
}

#[tokio::test]
async fn test_delete_missing_certificate() {
    let app = TestApp::new();
    let response = app
        .delete(&uris::item(uris::TRUSTSTORE, "5"), &app.admin_token())
        .await;

    response.assert_not_found();
}

#[tokio::test]
async fn test_delete_requires_configure_manager() {
    let app = seeded(CertificateDomain::TrustStoreAuthority, &["1"]);
    let response = app
        .delete(&uris::item(uris::TRUSTSTORE, "1"), &app.readonly_token())
        .await;

    response.assert_forbidden();
    assert!(app
        .bus
        .object_exists("/xyz/openbmc_project/certs/authority/truststore/1"));
}

#[tokio::test]
async fn test_https_certificate_cannot_be_deleted() {
    let app = seeded(CertificateDomain::ServerTransport, &["1"]);
    let response = app
        .delete(&uris::item(uris::HTTPS, "1"), &app.admin_token())
        .await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    assert!(app
        .bus
        .object_exists("/xyz/openbmc_project/certs/server/https/1"));
}
