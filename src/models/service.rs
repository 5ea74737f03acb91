//! CertificateService root and CertificateLocations models

use serde::{Deserialize, Serialize};

use super::ODataLink;

pub const CERTIFICATE_SERVICE_URI: &str = "/redfish/v1/CertificateService";
pub const CERTIFICATE_LOCATIONS_URI: &str = "/redfish/v1/CertificateService/CertificateLocations";
pub const REPLACE_CERTIFICATE_TARGET: &str =
    "/redfish/v1/CertificateService/Actions/CertificateService.ReplaceCertificate";
pub const GENERATE_CSR_TARGET: &str =
    "/redfish/v1/CertificateService/Actions/CertificateService.GenerateCSR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionTarget {
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplaceCertificateAction {
    pub target: String,
    #[serde(rename = "CertificateType@Redfish.AllowableValues")]
    pub allowable_certificate_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateServiceActions {
    #[serde(rename = "#CertificateService.ReplaceCertificate")]
    pub replace_certificate: ReplaceCertificateAction,
    #[serde(rename = "#CertificateService.GenerateCSR")]
    pub generate_csr: ActionTarget,
}

/// `GET /redfish/v1/CertificateService`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateServiceRoot {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub id: String,
    pub name: String,
    pub description: String,
    /// Only present for callers allowed to read the locations resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_locations: Option<ODataLink>,
    pub actions: CertificateServiceActions,
}

impl CertificateServiceRoot {
    pub fn new(allowed_types: &[String], show_locations: bool) -> Self {
        Self {
            odata_id: CERTIFICATE_SERVICE_URI.to_string(),
            odata_type: "#CertificateService.v1_0_0.CertificateService".to_string(),
            id: "CertificateService".to_string(),
            name: "Certificate Service".to_string(),
            description: "Actions available to manage certificates".to_string(),
            certificate_locations: show_locations
                .then(|| ODataLink::new(CERTIFICATE_LOCATIONS_URI)),
            actions: CertificateServiceActions {
                replace_certificate: ReplaceCertificateAction {
                    target: REPLACE_CERTIFICATE_TARGET.to_string(),
                    allowable_certificate_types: allowed_types.to_vec(),
                },
                generate_csr: ActionTarget {
                    target: GENERATE_CSR_TARGET.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateLinks {
    #[serde(rename = "Certificates")]
    pub certificates: Vec<ODataLink>,
    #[serde(rename = "Certificates@odata.count")]
    pub certificates_count: usize,
}

/// `GET /redfish/v1/CertificateService/CertificateLocations`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateLocations {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub links: CertificateLinks,
}

impl CertificateLocations {
    pub fn new(certificates: Vec<ODataLink>) -> Self {
        Self {
            odata_id: CERTIFICATE_LOCATIONS_URI.to_string(),
            odata_type: "#CertificateLocations.v1_0_0.CertificateLocations".to_string(),
            id: "CertificateLocations".to_string(),
            name: "Certificate Locations".to_string(),
            description: "Defines a resource that an administrator can use in order to \
                          locate all certificates installed on a given service"
                .to_string(),
            links: CertificateLinks {
                certificates_count: certificates.len(),
                certificates,
            },
        }
    }
}
