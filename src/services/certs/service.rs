//! Certificate CRUD over the management bus

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::paths::{
    CertificateDomain, PathTranslator, CERTIFICATE_INTERFACE, CERTS_BASE_PATH, DELETE_INTERFACE,
    INSTALL_INTERFACE, REPLACE_INTERFACE,
};
use super::projector::{project, CertificateProperties};
use super::staging::StagedCertificate;
use crate::models::{
    Certificate, CertificateCollection, CertificateLocations, ODataLink,
    ReplaceCertificateRequest, CERTIFICATE_COLLECTION_ODATA_TYPE,
};
use crate::services::bus::{path_filename, BusClient, BusError};
use crate::utils::validation::validate_path_element;
use crate::utils::{AppError, AppResult};

const REPLACE_ACTION: &str = "ReplaceCertificate";
const DEFAULT_CERTIFICATE_TYPE: &str = "PEM";

/// A certificate together with its canonical URI, for the `Location` header
#[derive(Debug, Clone)]
pub struct CertificateView {
    pub certificate: Certificate,
    pub location: String,
}

/// Certificate operations backed by the bus certificate managers.
///
/// Holds no per-certificate state: every call goes to the bus.
pub struct CertificateService {
    bus: Arc<dyn BusClient>,
    paths: PathTranslator,
    staging_dir: PathBuf,
    allowed_types: Vec<String>,
}

impl CertificateService {
    pub fn new(
        bus: Arc<dyn BusClient>,
        paths: PathTranslator,
        staging_dir: impl Into<PathBuf>,
        allowed_types: Vec<String>,
    ) -> Self {
        Self {
            bus,
            paths,
            staging_dir: staging_dir.into(),
            allowed_types,
        }
    }

    pub fn paths(&self) -> &PathTranslator {
        &self.paths
    }

    pub fn allowed_types(&self) -> &[String] {
        &self.allowed_types
    }

    /// Reject manager-scoped URIs naming another manager
    pub fn check_manager(&self, manager_id: &str) -> AppResult<()> {
        if manager_id == self.paths.manager_id() {
            Ok(())
        } else {
            Err(AppError::ResourceNotFound {
                kind: "Manager".to_string(),
                id: manager_id.to_string(),
            })
        }
    }

    fn is_allowed_type(&self, certificate_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == certificate_type)
    }

    /// Resource links for every certificate object below `base_path`.
    /// Objects that belong to no known manager are skipped.
    async fn certificate_links(&self, base_path: &str) -> AppResult<Vec<ODataLink>> {
        let object_paths = self
            .bus
            .get_subtree_paths(base_path, 0, &[CERTIFICATE_INTERFACE])
            .await
            .map_err(|e| AppError::Internal(format!("certificate enumeration failed: {}", e)))?;

        Ok(object_paths
            .iter()
            .filter_map(|object_path| match self.paths.locate_object(object_path) {
                Some((_, _, uri)) => Some(ODataLink::new(uri)),
                None => {
                    debug!(path = %object_path, "Skipping object outside known certificate managers");
                    None
                }
            })
            .collect())
    }

    /// List the certificates of one domain
    pub async fn list(&self, domain: CertificateDomain) -> AppResult<CertificateCollection> {
        let members = self.certificate_links(domain.object_path()).await?;

        Ok(CertificateCollection {
            odata_id: self.paths.collection_uri(domain),
            odata_type: CERTIFICATE_COLLECTION_ODATA_TYPE.to_string(),
            name: domain.collection_name().to_string(),
            description: domain.collection_description().to_string(),
            members_count: members.len(),
            members,
        })
    }

    /// List every certificate across all managers
    pub async fn list_locations(&self) -> AppResult<CertificateLocations> {
        let links = self.certificate_links(CERTS_BASE_PATH).await?;
        Ok(CertificateLocations::new(links))
    }

    /// Read one certificate.
    ///
    /// Any failure to read the property set reports the certificate as
    /// missing; the logs tell an absent object from a transport failure.
    pub async fn get(&self, domain: CertificateDomain, id: &str) -> AppResult<CertificateView> {
        if !validate_path_element(id) {
            return Err(AppError::certificate_not_found(id));
        }

        let location = self.paths.resolve(domain, id);
        debug!(path = %location.object_path, service = location.service, "Reading certificate");

        let properties = match self
            .bus
            .get_all_properties(location.service, &location.object_path, CERTIFICATE_INTERFACE)
            .await
        {
            Ok(properties) => properties,
            Err(BusError::UnknownObject(_)) => {
                debug!(path = %location.object_path, "Certificate object does not exist");
                return Err(AppError::certificate_not_found(id));
            }
            Err(e) => {
                error!(path = %location.object_path, error = %e, "Failed to read certificate properties");
                return Err(AppError::certificate_not_found(id));
            }
        };

        let resource_uri = self.paths.resource_uri(domain, id);
        let certificate = project(
            CertificateProperties::unpack(&properties)?,
            id,
            &resource_uri,
            domain.certificate_name(),
        );

        Ok(CertificateView {
            certificate,
            location: resource_uri,
        })
    }

    /// Install a new certificate into a domain's collection
    pub async fn install(
        &self,
        domain: CertificateDomain,
        certificate: &str,
        certificate_type: Option<&str>,
    ) -> AppResult<CertificateView> {
        let certificate_type = certificate_type.unwrap_or(DEFAULT_CERTIFICATE_TYPE);
        if !self.is_allowed_type(certificate_type) {
            return Err(AppError::PropertyValueNotInList {
                property: "CertificateType".to_string(),
                value: certificate_type.to_string(),
            });
        }
        if certificate.is_empty() {
            warn!("Cannot get certificate from request body");
            return Err(AppError::UnrecognizedRequestBody);
        }

        let staged = StagedCertificate::acquire(&self.staging_dir, certificate).await?;
        let reply = self
            .bus
            .call(
                domain.service_name(),
                domain.object_path(),
                INSTALL_INTERFACE,
                "Install",
                vec![staged.path().to_string_lossy().into_owned().into()],
            )
            .await;

        let object_path = match reply {
            Ok(value) => value.as_str().map(str::to_string).ok_or_else(|| {
                AppError::Internal(format!("Install returned {} instead of a path", value.type_name()))
            })?,
            Err(e) => {
                return Err(write_error(e, path_filename(domain.object_path()), certificate));
            }
        };
        drop(staged);

        let (installed_domain, id, _) = self
            .paths
            .locate_object(&object_path)
            .filter(|(d, _, _)| *d == domain)
            .ok_or_else(|| {
                AppError::Internal(format!("Install created unexpected object {}", object_path))
            })?;

        info!(path = %object_path, "Installed certificate");
        self.get(installed_domain, &id).await
    }

    /// Replace the certificate named by `CertificateUri`
    pub async fn replace(&self, request: ReplaceCertificateRequest) -> AppResult<CertificateView> {
        let certificate = request
            .certificate_string
            .ok_or_else(|| AppError::PropertyMissing("CertificateString".to_string()))?;
        let uri = request
            .certificate_uri
            .ok_or_else(|| AppError::PropertyMissing("CertificateUri".to_string()))?
            .odata_id;

        let certificate_type = request
            .certificate_type
            .unwrap_or_else(|| DEFAULT_CERTIFICATE_TYPE.to_string());
        if !self.is_allowed_type(&certificate_type) {
            return Err(AppError::ActionParameterNotSupported {
                parameter: "CertificateType".to_string(),
                action: REPLACE_ACTION.to_string(),
            });
        }

        info!(uri = %uri, "Certificate URI to replace");
        let (domain, id) = self
            .paths
            .parse_certificate_uri(&uri)
            .map_err(|_| AppError::ActionParameterValueFormatError {
                value: uri.clone(),
                parameter: "CertificateUri".to_string(),
                action: REPLACE_ACTION.to_string(),
            })?
            .ok_or_else(|| AppError::ActionParameterNotSupported {
                parameter: "CertificateUri".to_string(),
                action: REPLACE_ACTION.to_string(),
            })?;

        if !validate_path_element(&id) {
            return Err(AppError::certificate_not_found(id));
        }

        let location = self.paths.resolve(domain, &id);
        let staged = StagedCertificate::acquire(&self.staging_dir, &certificate).await?;
        let reply = self
            .bus
            .call(
                location.service,
                &location.object_path,
                REPLACE_INTERFACE,
                "Replace",
                vec![staged.path().to_string_lossy().into_owned().into()],
            )
            .await;
        drop(staged);

        if let Err(e) = reply {
            return Err(write_error(e, &id, &certificate));
        }

        info!(path = %location.object_path, "Replaced certificate");
        self.get(domain, &id).await
    }

    /// Delete one certificate
    pub async fn delete(&self, domain: CertificateDomain, id: &str) -> AppResult<()> {
        if !validate_path_element(id) {
            return Err(AppError::certificate_not_found(id));
        }

        let location = self.paths.resolve(domain, id);
        match self
            .bus
            .call(location.service, &location.object_path, DELETE_INTERFACE, "Delete", vec![])
            .await
        {
            Ok(_) => {
                info!(path = %location.object_path, "Certificate deleted");
                Ok(())
            }
            Err(BusError::UnknownObject(_)) => Err(AppError::certificate_not_found(id)),
            Err(e) => Err(AppError::Internal(format!(
                "failed to delete {}: {}",
                location.object_path, e
            ))),
        }
    }
}

/// Translate an Install/Replace failure
fn write_error(err: BusError, id: &str, certificate: &str) -> AppError {
    error!(error = %err, "Certificate write rejected by bus");
    match err {
        BusError::UnknownObject(_) => AppError::certificate_not_found(id),
        BusError::InvalidCertificate(_) => AppError::PropertyValueIncorrect {
            property: "Certificate".to_string(),
            value: certificate.to_string(),
        },
        other => AppError::Internal(other.to_string()),
    }
}
