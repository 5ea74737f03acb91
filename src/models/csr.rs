//! Certificate signing request models

use serde::{Deserialize, Serialize};

use super::ODataLink;

pub const DEFAULT_KEY_PAIR_ALGORITHM: &str = "EC";
pub const DEFAULT_KEY_CURVE_ID: &str = "secp384r1";
pub const DEFAULT_KEY_BIT_LENGTH: i64 = 2048;

fn default_key_pair_algorithm() -> String {
    DEFAULT_KEY_PAIR_ALGORITHM.to_string()
}

fn default_key_curve_id() -> String {
    DEFAULT_KEY_CURVE_ID.to_string()
}

fn default_key_bit_length() -> i64 {
    DEFAULT_KEY_BIT_LENGTH
}

/// Body of the GenerateCSR action.
///
/// Required subject fields are optional here so the missing one can be
/// reported by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateCsrRequest {
    pub certificate_collection: Option<ODataLink>,
    pub city: Option<String>,
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub state: Option<String>,

    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(default)]
    pub challenge_password: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub initials: String,
    #[serde(default = "default_key_bit_length")]
    pub key_bit_length: i64,
    #[serde(default = "default_key_curve_id")]
    pub key_curve_id: String,
    #[serde(default = "default_key_pair_algorithm")]
    pub key_pair_algorithm: String,
    #[serde(default)]
    pub key_usage: Vec<String>,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub unstructured_name: String,
}

/// Result of a completed CSR session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateCsrResponse {
    #[serde(rename = "CSRString")]
    pub csr_string: String,
    #[serde(rename = "CertificateCollection")]
    pub certificate_collection: ODataLink,
}
