//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for a single bus object path element
static PATH_ELEMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"));

/// Regex for a manager id as it appears in a resource URI
static MANAGER_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));

/// Validate that a certificate id can be appended to a bus object path
pub fn validate_path_element(id: &str) -> bool {
    id.len() <= 255 && PATH_ELEMENT_REGEX.is_match(id)
}

/// Validate a manager id from configuration
pub fn validate_manager_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && MANAGER_ID_REGEX.is_match(id)
}
