//! Projection of certificate object properties into resource documents

use chrono::DateTime;

use crate::models::{Certificate, CertificateIdentity, CERTIFICATE_ODATA_TYPE};
use crate::services::bus::{BusValue, PropertyMap};
use crate::utils::AppError;

/// Properties of the certificate interface this gateway understands
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CertificateProperties {
    pub certificate_string: Option<String>,
    pub key_usage: Option<Vec<String>>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub valid_not_after: Option<u64>,
    pub valid_not_before: Option<u64>,
}

impl CertificateProperties {
    /// Pick the known properties out of a property map.
    ///
    /// Absent properties stay `None`. A known property carrying a value of
    /// the wrong type makes the whole set unusable.
    pub fn unpack(properties: &PropertyMap) -> Result<Self, AppError> {
        Ok(Self {
            certificate_string: string_property(properties, "CertificateString")?,
            key_usage: properties
                .get("KeyUsage")
                .map(|value| {
                    value
                        .as_string_list()
                        .map(<[String]>::to_vec)
                        .ok_or_else(|| type_mismatch("KeyUsage", value))
                })
                .transpose()?,
            issuer: string_property(properties, "Issuer")?,
            subject: string_property(properties, "Subject")?,
            valid_not_after: u64_property(properties, "ValidNotAfter")?,
            valid_not_before: u64_property(properties, "ValidNotBefore")?,
        })
    }
}

fn type_mismatch(name: &str, value: &BusValue) -> AppError {
    AppError::Internal(format!(
        "certificate property {} has unexpected type {}",
        name,
        value.type_name()
    ))
}

fn string_property(properties: &PropertyMap, name: &str) -> Result<Option<String>, AppError> {
    properties
        .get(name)
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| type_mismatch(name, value))
        })
        .transpose()
}

fn u64_property(properties: &PropertyMap, name: &str) -> Result<Option<u64>, AppError> {
    properties
        .get(name)
        .map(|value| value.as_u64().ok_or_else(|| type_mismatch(name, value)))
        .transpose()
}

/// Decompose a distinguished name such as `O=openbmc-project.xyz,CN=localhost`.
///
/// Unknown keys are skipped. Parsing stops at the first token without `=`,
/// keeping whatever was collected before it.
pub fn parse_distinguished_name(value: &str) -> CertificateIdentity {
    let mut identity = CertificateIdentity::default();

    for token in value.split(',') {
        let Some((key, val)) = token.split_once('=') else {
            break;
        };
        let slot = match key {
            "L" => &mut identity.city,
            "CN" => &mut identity.common_name,
            "C" => &mut identity.country,
            "O" => &mut identity.organization,
            "OU" => &mut identity.organizational_unit,
            "ST" => &mut identity.state,
            _ => continue,
        };
        *slot = Some(val.to_string());
    }

    identity
}

/// Render epoch seconds as `YYYY-MM-DDTHH:MM:SS+00:00`
pub fn format_timestamp(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string())
        .unwrap_or_default()
}

/// Build the certificate resource
pub fn project(
    properties: CertificateProperties,
    id: &str,
    resource_uri: &str,
    name: &str,
) -> Certificate {
    Certificate {
        odata_id: resource_uri.to_string(),
        odata_type: CERTIFICATE_ODATA_TYPE.to_string(),
        id: id.to_string(),
        name: name.to_string(),
        description: name.to_string(),
        certificate_string: properties.certificate_string.unwrap_or_default(),
        key_usage: properties.key_usage.unwrap_or_default(),
        issuer: properties.issuer.as_deref().map(parse_distinguished_name),
        subject: properties.subject.as_deref().map(parse_distinguished_name),
        valid_not_after: properties.valid_not_after.map(format_timestamp),
        valid_not_before: properties.valid_not_before.map(format_timestamp),
    }
}
