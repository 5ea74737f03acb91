//! Certificate resource models

use serde::{Deserialize, Serialize};

/// `@odata.type` of a single certificate resource
pub const CERTIFICATE_ODATA_TYPE: &str = "#Certificate.v1_0_0.Certificate";
/// `@odata.type` of a certificate collection
pub const CERTIFICATE_COLLECTION_ODATA_TYPE: &str = "#CertificateCollection.CertificateCollection";

/// Reference to another resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ODataLink {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

impl ODataLink {
    pub fn new(odata_id: impl Into<String>) -> Self {
        Self {
            odata_id: odata_id.into(),
        }
    }
}

/// Issuer or subject of a certificate, decomposed from its distinguished name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// A certificate resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Certificate {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub id: String,
    pub name: String,
    pub description: String,
    /// PEM text as reported by the certificate manager
    pub certificate_string: String,
    pub key_usage: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<CertificateIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<CertificateIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_not_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_not_before: Option<String>,
}

/// Collection of certificate references
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateCollection {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub name: String,
    pub description: String,
    pub members: Vec<ODataLink>,
    #[serde(rename = "Members@odata.count")]
    pub members_count: usize,
}

/// Body of an install request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstallCertificateRequest {
    pub certificate_string: String,
    #[serde(default)]
    pub certificate_type: Option<String>,
}

/// Body of the ReplaceCertificate action.
/// Fields are optional so a missing one can be named in the error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplaceCertificateRequest {
    pub certificate_string: Option<String>,
    pub certificate_type: Option<String>,
    pub certificate_uri: Option<ODataLink>,
}
