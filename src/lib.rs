//! Certgate Library
//!
//! Redfish certificate resources backed by the certificate manager services
//! on the management bus: listing, reading, installing, replacing and
//! deleting certificates, plus single-flight CSR generation.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use middleware::{auth_middleware, AuthUser, Claims, Privilege};
use services::{BusClient, CertificateService, CsrCoordinator, PathTranslator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Management bus connection
    pub bus: Arc<dyn BusClient>,
    /// Certificate CRUD operations
    pub certificates: Arc<CertificateService>,
    /// CSR session coordinator
    pub csr: Arc<CsrCoordinator>,
}

impl AppState {
    pub fn new(config: AppConfig, bus: Arc<dyn BusClient>) -> Self {
        let paths = PathTranslator::new(config.redfish.manager_id.clone());

        let certificates = Arc::new(CertificateService::new(
            Arc::clone(&bus),
            paths.clone(),
            config.certificates.staging_dir.clone(),
            config.certificates.allowed_certificate_types.clone(),
        ));
        let csr = Arc::new(CsrCoordinator::new(
            Arc::clone(&bus),
            paths,
            config.certificates.csr_timeout(),
        ));

        Self {
            config,
            bus,
            certificates,
            csr,
        }
    }
}
