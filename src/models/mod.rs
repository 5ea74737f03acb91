//! Data models

mod certificate;
mod csr;
mod service;

pub use certificate::*;
pub use csr::*;
pub use service::*;
