//! Mapping between certificate resource URIs and bus coordinates
//!
//! Pure functions only: nothing here performs I/O or holds mutable state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::bus::{path_filename, path_join, path_parent};

/// Common root of every certificate manager object
pub const CERTS_BASE_PATH: &str = "/xyz/openbmc_project/certs";

pub const INSTALL_INTERFACE: &str = "xyz.openbmc_project.Certs.Install";
pub const REPLACE_INTERFACE: &str = "xyz.openbmc_project.Certs.Replace";
pub const DELETE_INTERFACE: &str = "xyz.openbmc_project.Object.Delete";
pub const CERTIFICATE_INTERFACE: &str = "xyz.openbmc_project.Certs.Certificate";
pub const CSR_INTERFACE: &str = "xyz.openbmc_project.Certs.CSR";
pub const CSR_CREATE_INTERFACE: &str = "xyz.openbmc_project.Certs.CSR.Create";

/// The three certificate categories managed by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateDomain {
    /// Certificate presented by the HTTPS server
    ServerTransport,
    /// Client certificate used by the LDAP client
    DirectoryClient,
    /// Trusted authority certificates
    TrustStoreAuthority,
}

impl CertificateDomain {
    pub const ALL: [CertificateDomain; 3] = [
        CertificateDomain::ServerTransport,
        CertificateDomain::DirectoryClient,
        CertificateDomain::TrustStoreAuthority,
    ];

    /// Bus service owning this domain's certificate manager
    pub fn service_name(self) -> &'static str {
        match self {
            CertificateDomain::ServerTransport => "xyz.openbmc_project.Certs.Manager.Server.Https",
            CertificateDomain::DirectoryClient => "xyz.openbmc_project.Certs.Manager.Client.Ldap",
            CertificateDomain::TrustStoreAuthority => {
                "xyz.openbmc_project.Certs.Manager.Authority.Truststore"
            }
        }
    }

    /// Object path of the certificate manager; certificates live directly below it
    pub fn object_path(self) -> &'static str {
        match self {
            CertificateDomain::ServerTransport => "/xyz/openbmc_project/certs/server/https",
            CertificateDomain::DirectoryClient => "/xyz/openbmc_project/certs/client/ldap",
            CertificateDomain::TrustStoreAuthority => {
                "/xyz/openbmc_project/certs/authority/truststore"
            }
        }
    }

    /// Display name of a single certificate in this domain
    pub fn certificate_name(self) -> &'static str {
        match self {
            CertificateDomain::ServerTransport => "HTTPS Certificate",
            CertificateDomain::DirectoryClient => "LDAP Certificate",
            CertificateDomain::TrustStoreAuthority => "TrustStore Certificate",
        }
    }

    pub fn collection_name(self) -> &'static str {
        match self {
            CertificateDomain::ServerTransport => "HTTPS Certificates Collection",
            CertificateDomain::DirectoryClient => "LDAP Certificates Collection",
            CertificateDomain::TrustStoreAuthority => "TrustStore Certificates Collection",
        }
    }

    pub fn collection_description(self) -> &'static str {
        match self {
            CertificateDomain::ServerTransport => "A Collection of HTTPS certificate instances",
            CertificateDomain::DirectoryClient => "A Collection of LDAP certificate instances",
            CertificateDomain::TrustStoreAuthority => {
                "A Collection of TrustStore certificate instances"
            }
        }
    }

    /// The only key usage a CSR for this domain may request.
    /// `None` means the domain does not accept CSR generation.
    pub fn expected_key_usage(self) -> Option<&'static str> {
        match self {
            CertificateDomain::ServerTransport => Some("ServerAuthentication"),
            CertificateDomain::DirectoryClient => Some("ClientAuthentication"),
            CertificateDomain::TrustStoreAuthority => None,
        }
    }

    /// Server certificates are only ever replaced, never deleted
    pub fn supports_delete(self) -> bool {
        !matches!(self, CertificateDomain::ServerTransport)
    }

    /// Domain whose manager lives exactly at `path`
    pub fn from_object_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.object_path() == path)
    }
}

/// Bus coordinates of one certificate object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusLocation {
    pub service: &'static str,
    pub object_path: String,
}

/// A resource URI that could not be parsed as a relative reference
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed resource URI: {0}")]
pub struct MalformedUri(pub String);

/// Translates between resource URIs and bus object paths
#[derive(Debug, Clone)]
pub struct PathTranslator {
    manager_id: String,
}

impl PathTranslator {
    pub fn new(manager_id: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
        }
    }

    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    /// Bus coordinates of certificate `id` in `domain`
    pub fn resolve(&self, domain: CertificateDomain, id: &str) -> BusLocation {
        BusLocation {
            service: domain.service_name(),
            object_path: path_join(domain.object_path(), id),
        }
    }

    /// Domain of a certificate object, judged by its parent path
    pub fn classify(&self, object_path: &str) -> Option<CertificateDomain> {
        CertificateDomain::from_object_path(path_parent(object_path))
    }

    pub fn collection_uri(&self, domain: CertificateDomain) -> String {
        match domain {
            CertificateDomain::ServerTransport => format!(
                "/redfish/v1/Managers/{}/NetworkProtocol/HTTPS/Certificates",
                self.manager_id
            ),
            CertificateDomain::DirectoryClient => {
                "/redfish/v1/AccountService/LDAP/Certificates".to_string()
            }
            CertificateDomain::TrustStoreAuthority => {
                format!("/redfish/v1/Managers/{}/Truststore/Certificates", self.manager_id)
            }
        }
    }

    pub fn resource_uri(&self, domain: CertificateDomain, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_uri(domain),
            urlencoding::encode(id)
        )
    }

    /// Domain, id and resource URI for a certificate object path.
    /// Paths outside the known managers, or without an id, yield `None`.
    pub fn locate_object(&self, object_path: &str) -> Option<(CertificateDomain, String, String)> {
        let domain = self.classify(object_path)?;
        let id = path_filename(object_path);
        if id.is_empty() {
            return None;
        }
        Some((domain, id.to_string(), self.resource_uri(domain, id)))
    }

    /// Parse a certificate resource URI into its domain and id.
    ///
    /// `Ok(None)` means the URI is well formed but names no certificate
    /// this gateway manages.
    pub fn parse_certificate_uri(
        &self,
        uri: &str,
    ) -> Result<Option<(CertificateDomain, String)>, MalformedUri> {
        let segments = split_relative_ref(uri)?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let matched = match segments.as_slice() {
            ["redfish", "v1", "Managers", manager, "NetworkProtocol", "HTTPS", "Certificates", id]
                if *manager == self.manager_id =>
            {
                Some((CertificateDomain::ServerTransport, *id))
            }
            ["redfish", "v1", "AccountService", "LDAP", "Certificates", id] => {
                Some((CertificateDomain::DirectoryClient, *id))
            }
            ["redfish", "v1", "Managers", manager, "Truststore", "Certificates", id]
                if *manager == self.manager_id =>
            {
                Some((CertificateDomain::TrustStoreAuthority, *id))
            }
            _ => None,
        };

        Ok(matched
            .filter(|(_, id)| !id.is_empty())
            .map(|(domain, id)| (domain, id.to_string())))
    }

    /// Domain whose collection URI prefixes `uri`
    pub fn parse_collection_uri(&self, uri: &str) -> Option<CertificateDomain> {
        CertificateDomain::ALL.into_iter().find(|domain| {
            let collection = self.collection_uri(*domain);
            uri.strip_prefix(collection.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// Split an absolute-path relative reference into decoded segments.
/// Query and fragment are ignored, a trailing slash is tolerated.
fn split_relative_ref(uri: &str) -> Result<Vec<String>, MalformedUri> {
    let malformed = || MalformedUri(uri.to_string());

    if uri.is_empty() || uri.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(malformed());
    }

    let path = uri.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix('/').ok_or_else(malformed)?;
    let path = path.strip_suffix('/').unwrap_or(path);

    path.split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .map_err(|_| malformed())
        })
        .collect()
}
