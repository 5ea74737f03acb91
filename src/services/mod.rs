//! Business logic services

pub mod bus;
pub mod certs;
pub mod csr;

pub use bus::{BusClient, BusError, MemoryBus};
pub use certs::{CertificateDomain, CertificateService, PathTranslator};
pub use csr::{CsrCoordinator, CsrStats};
