//! Certificate management: URI/bus path translation, staging of certificate
//! material, property projection and the CRUD operations built on them.

pub mod paths;
pub mod projector;
pub mod service;
pub mod staging;

pub use paths::{CertificateDomain, PathTranslator};
pub use service::{CertificateService, CertificateView};
pub use staging::StagedCertificate;
