//! Management bus client abstraction
//!
//! The gateway never talks to a concrete transport directly. Everything goes
//! through [`BusClient`], which exposes the four primitives the certificate
//! services need: method calls, property reads, subtree enumeration and
//! signal subscription. Raw error names coming off the wire are translated
//! into [`BusError`] exactly once, here, so the rest of the crate matches on
//! a closed enum instead of strings.

pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream};
use tracing::info;

use crate::config::{BusBackend, BusConfig};

pub use memory::MemoryBus;

/// Error name reported when the target object path does not exist
pub const UNKNOWN_OBJECT_ERROR: &str = "org.freedesktop.DBus.Error.UnknownObject";
/// Error name reported by certificate managers for unparsable or rejected certificates
pub const INVALID_CERTIFICATE_ERROR: &str = "xyz.openbmc_project.Certs.Error.InvalidCertificate";
/// Generic failure reported by bus services
pub const INTERNAL_FAILURE_ERROR: &str = "xyz.openbmc_project.Common.Error.InternalFailure";
/// Error name for a method the target object does not implement
pub const UNKNOWN_METHOD_ERROR: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// Interface that emits object tree change signals
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
/// Signal member announcing a newly added object
pub const INTERFACES_ADDED_MEMBER: &str = "InterfacesAdded";

/// A single typed value carried over the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BusValue {
    Unit,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    String(String),
    ObjectPath(String),
    StringList(Vec<String>),
}

impl BusValue {
    /// Borrow the value as a string (plain strings and object paths)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BusValue::String(s) | BusValue::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            BusValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BusValue::Int64(v) => Some(*v),
            BusValue::Int32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            BusValue::StringList(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            BusValue::Unit => "unit",
            BusValue::Bool(_) => "bool",
            BusValue::Int32(_) => "int32",
            BusValue::Int64(_) => "int64",
            BusValue::UInt64(_) => "uint64",
            BusValue::String(_) => "string",
            BusValue::ObjectPath(_) => "object_path",
            BusValue::StringList(_) => "string_list",
        }
    }
}

impl From<&str> for BusValue {
    fn from(value: &str) -> Self {
        BusValue::String(value.to_string())
    }
}

impl From<String> for BusValue {
    fn from(value: String) -> Self {
        BusValue::String(value)
    }
}

impl From<Vec<String>> for BusValue {
    fn from(value: Vec<String>) -> Self {
        BusValue::StringList(value)
    }
}

impl From<i64> for BusValue {
    fn from(value: i64) -> Self {
        BusValue::Int64(value)
    }
}

impl From<u64> for BusValue {
    fn from(value: u64) -> Self {
        BusValue::UInt64(value)
    }
}

/// Property name to value mapping for one interface of one object
pub type PropertyMap = HashMap<String, BusValue>;

/// Interface name to properties mapping, as carried by `InterfacesAdded`
pub type InterfaceMap = HashMap<String, PropertyMap>;

/// Errors surfaced by the bus boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    /// The addressed object path does not exist
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// The certificate manager rejected the certificate material
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Any other named error returned by a bus service
    #[error("{name}: {message}")]
    Failed { name: String, message: String },

    /// The call never produced a named reply (connection loss, timeout, ...)
    #[error("bus transport error: {0}")]
    Transport(String),
}

impl BusError {
    /// Translate a wire-level error into the closed error set
    pub fn from_error_name(name: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match name {
            Some(UNKNOWN_OBJECT_ERROR) => BusError::UnknownObject(message),
            Some(INVALID_CERTIFICATE_ERROR) => BusError::InvalidCertificate(message),
            Some(name) => BusError::Failed {
                name: name.to_string(),
                message,
            },
            None => BusError::Transport(message),
        }
    }
}

/// Signal match rule used when subscribing to object tree changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl MatchRule {
    /// Match `InterfacesAdded` signals emitted by the object manager at `path`
    pub fn interfaces_added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interface: OBJECT_MANAGER_INTERFACE.to_string(),
            member: INTERFACES_ADDED_MEMBER.to_string(),
        }
    }

    pub fn matches(&self, path: &str, interface: &str, member: &str) -> bool {
        self.path == path && self.interface == interface && self.member == member
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type='signal',interface='{}',path='{}',member='{}'",
            self.interface, self.path, self.member
        )
    }
}

/// Payload of an `InterfacesAdded` signal
#[derive(Debug, Clone)]
pub struct InterfacesAdded {
    pub object_path: String,
    pub interfaces: InterfaceMap,
}

impl InterfacesAdded {
    pub fn has_interface(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }
}

/// Live signal subscription
///
/// Yields events until dropped. Dropping the subscription releases the match
/// on the bus side.
pub struct Subscription {
    rule: MatchRule,
    events: ReceiverStream<InterfacesAdded>,
}

impl Subscription {
    pub fn new(rule: MatchRule, receiver: mpsc::Receiver<InterfacesAdded>) -> Self {
        Self {
            rule,
            events: ReceiverStream::new(receiver),
        }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }
}

impl Stream for Subscription {
    type Item = InterfacesAdded;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("rule", &self.rule).finish()
    }
}

/// Asynchronous management bus client
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Invoke `method` of `interface` on the object at `path` owned by `service`
    async fn call(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<BusValue>,
    ) -> Result<BusValue, BusError>;

    /// Read every property of `interface` on the object at `path`
    async fn get_all_properties(
        &self,
        service: &str,
        path: &str,
        interface: &str,
    ) -> Result<PropertyMap, BusError>;

    /// List object paths below `base_path` implementing any of `interfaces`.
    /// A `depth` of 0 means unlimited.
    async fn get_subtree_paths(
        &self,
        base_path: &str,
        depth: u32,
        interfaces: &[&str],
    ) -> Result<Vec<String>, BusError>;

    /// Subscribe to signals matching `rule`
    async fn subscribe(&self, rule: MatchRule) -> Result<Subscription, BusError>;
}

/// Open the configured bus backend
pub fn connect(config: &BusConfig) -> Arc<dyn BusClient> {
    match config.backend {
        BusBackend::Memory => {
            let bus = MemoryBus::new();
            bus.set_csr_delay(config.csr_delay_ms.map(Duration::from_millis));
            info!(csr_delay_ms = ?config.csr_delay_ms, "Using in-memory certificate managers");
            Arc::new(bus)
        }
    }
}

/// Last element of an object path, empty for the root
pub fn path_filename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or("")
}

/// Object path with its last element removed
pub fn path_parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "",
    }
}

/// Append one element to an object path
pub fn path_join(base: &str, element: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), element)
}
