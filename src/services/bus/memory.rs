//! In-process bus emulation
//!
//! `MemoryBus` hosts the three certificate managers in memory and answers the
//! same calls the real managers do. It backs the `memory` bus backend and the
//! test suite, which also uses its call log and fault injection hooks.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    path_join, BusClient, BusError, BusValue, InterfaceMap, InterfacesAdded, MatchRule,
    PropertyMap, Subscription, INTERFACES_ADDED_MEMBER, INTERNAL_FAILURE_ERROR,
    INVALID_CERTIFICATE_ERROR, OBJECT_MANAGER_INTERFACE, UNKNOWN_METHOD_ERROR,
    UNKNOWN_OBJECT_ERROR,
};
use crate::services::certs::paths::{
    CertificateDomain, CERTIFICATE_INTERFACE, CSR_CREATE_INTERFACE, CSR_INTERFACE,
    DELETE_INTERFACE, INSTALL_INTERFACE, REPLACE_INTERFACE,
};

const UNKNOWN_INTERFACE_ERROR: &str = "org.freedesktop.DBus.Error.UnknownInterface";
const PEM_CERTIFICATE_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const SUBSCRIPTION_BUFFER: usize = 16;

/// Subject reported for every certificate held by the emulated managers
pub const DEFAULT_SUBJECT: &str = "C=US,ST=Oregon,L=Portland,O=OpenBMC,OU=Platform,CN=bmc.local";
/// Issuer reported for every certificate held by the emulated managers
pub const DEFAULT_ISSUER: &str = "C=US,O=OpenBMC,CN=OpenBMC Test CA";
/// 2024-01-01T00:00:00+00:00
pub const DEFAULT_VALID_NOT_BEFORE: u64 = 1_704_067_200;
/// 2034-01-01T00:00:00+00:00
pub const DEFAULT_VALID_NOT_AFTER: u64 = 2_019_686_400;

/// CSR text returned until overridden with [`MemoryBus::set_csr_text`]
pub const DEFAULT_CSR: &str = "-----BEGIN CERTIFICATE REQUEST-----\n\
MIIBODCBvwIBADBAMQswCQYDVQQGEwJVUzEQMA4GA1UECgwHT3BlbkJNQzEfMB0G\n\
A1UEAwwWYm1jLmxvY2FsLmV4YW1wbGUub3JnMHYwEAYHKoZIzj0CAQYFK4EEACID\n\
-----END CERTIFICATE REQUEST-----\n";

/// One call observed by the bus
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub args: Vec<BusValue>,
}

#[derive(Debug, Clone)]
struct BusObject {
    service: String,
    interfaces: InterfaceMap,
}

#[derive(Debug)]
struct Manager {
    domain: CertificateDomain,
    next_id: u64,
}

#[derive(Debug)]
struct Fault {
    method: String,
    error_name: Option<String>,
    message: String,
}

struct State {
    objects: BTreeMap<String, BusObject>,
    /// Manager object path to manager
    managers: HashMap<String, Manager>,
    subscribers: Vec<(MatchRule, mpsc::Sender<InterfacesAdded>)>,
    calls: Vec<RecordedCall>,
    subscriptions_opened: usize,
    faults: VecDeque<Fault>,
    csr_delay: Option<Duration>,
    csr_text: String,
}

impl State {
    fn emit_interfaces_added(&mut self, signal_path: &str, event: InterfacesAdded) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (rule, tx) in &self.subscribers {
            if rule.matches(signal_path, OBJECT_MANAGER_INTERFACE, INTERFACES_ADDED_MEMBER)
                && tx.try_send(event.clone()).is_err()
            {
                warn!(rule = %rule, "Dropping InterfacesAdded event for full subscriber");
            }
        }
    }

    fn take_fault(&mut self, method: &str) -> Option<BusError> {
        let index = self.faults.iter().position(|f| f.method == method)?;
        let fault = self.faults.remove(index)?;
        Some(BusError::from_error_name(
            fault.error_name.as_deref(),
            fault.message,
        ))
    }

    fn record(&mut self, service: &str, path: &str, interface: &str, method: &str, args: Vec<BusValue>) {
        self.calls.push(RecordedCall {
            service: service.to_string(),
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        });
    }

    fn object(&self, service: &str, path: &str) -> Result<&BusObject, BusError> {
        self.objects
            .get(path)
            .filter(|object| object.service == service)
            .ok_or_else(|| unknown_object(path))
    }
}

/// In-memory certificate manager emulation
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Create a bus hosting an empty certificate manager for every domain.
    /// CSR completion is signalled immediately.
    pub fn new() -> Self {
        let managers = CertificateDomain::ALL
            .into_iter()
            .map(|domain| {
                (
                    domain.object_path().to_string(),
                    Manager { domain, next_id: 1 },
                )
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                managers,
                subscribers: Vec::new(),
                calls: Vec::new(),
                subscriptions_opened: 0,
                faults: VecDeque::new(),
                csr_delay: Some(Duration::ZERO),
                csr_text: DEFAULT_CSR.to_string(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay between a GenerateCSR call and the completion signal.
    /// `None` means the signal is never sent.
    pub fn set_csr_delay(&self, delay: Option<Duration>) {
        self.lock().csr_delay = delay;
    }

    pub fn set_csr_text(&self, text: impl Into<String>) {
        self.lock().csr_text = text.into();
    }

    /// Make the next call of `method` fail with the given error name.
    /// Property reads use `GetAll`, enumeration `GetSubTreePaths`, subscriptions `AddMatch`.
    pub fn inject_fault(&self, method: &str, error_name: Option<&str>, message: &str) {
        self.lock().faults.push_back(Fault {
            method: method.to_string(),
            error_name: error_name.map(str::to_string),
            message: message.to_string(),
        });
    }

    /// Seed a certificate directly into a manager, bypassing Install
    pub fn insert_certificate(&self, domain: CertificateDomain, id: &str, pem: &str) -> String {
        let path = path_join(domain.object_path(), id);
        let mut state = self.lock();
        if let Some(manager) = state.managers.get_mut(domain.object_path()) {
            if let Ok(numeric) = id.parse::<u64>() {
                manager.next_id = manager.next_id.max(numeric + 1);
            }
        }
        state
            .objects
            .insert(path.clone(), certificate_object(domain, pem));
        path
    }

    /// Seed an arbitrary object
    pub fn insert_object(&self, path: &str, service: &str, interfaces: InterfaceMap) {
        self.lock().objects.insert(
            path.to_string(),
            BusObject {
                service: service.to_string(),
                interfaces,
            },
        );
    }

    /// Overwrite one property of an existing object
    pub fn set_property(&self, path: &str, interface: &str, name: &str, value: BusValue) -> bool {
        let mut state = self.lock();
        match state
            .objects
            .get_mut(path)
            .and_then(|object| object.interfaces.get_mut(interface))
        {
            Some(properties) => {
                properties.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Remove one property of an existing object
    pub fn remove_property(&self, path: &str, interface: &str, name: &str) -> bool {
        let mut state = self.lock();
        state
            .objects
            .get_mut(path)
            .and_then(|object| object.interfaces.get_mut(interface))
            .and_then(|properties| properties.remove(name))
            .is_some()
    }

    pub fn object_exists(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    pub fn certificate_text(&self, path: &str) -> Option<String> {
        self.lock()
            .objects
            .get(path)
            .and_then(|object| object.interfaces.get(CERTIFICATE_INTERFACE))
            .and_then(|properties| properties.get("CertificateString"))
            .and_then(|value| value.as_str().map(str::to_string))
    }

    /// Every call, property read and enumeration seen so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls of `method`
    pub fn method_count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Subscriptions opened over the lifetime of the bus
    pub fn subscriptions_opened(&self) -> usize {
        self.lock().subscriptions_opened
    }

    /// Subscriptions whose receiving side is still alive
    pub fn active_subscriptions(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }

    async fn install(&self, manager_path: &str, args: &[BusValue]) -> Result<BusValue, BusError> {
        let pem = read_certificate_file(args).await?;

        let mut state = self.lock();
        let manager = state
            .managers
            .get_mut(manager_path)
            .ok_or_else(|| unknown_object(manager_path))?;
        let domain = manager.domain;
        let path = path_join(manager_path, &manager.next_id.to_string());
        manager.next_id += 1;

        let object = certificate_object(domain, &pem);
        let event = InterfacesAdded {
            object_path: path.clone(),
            interfaces: object.interfaces.clone(),
        };
        state.objects.insert(path.clone(), object);
        state.emit_interfaces_added(manager_path, event);

        debug!(path = %path, "Installed certificate");
        Ok(BusValue::ObjectPath(path))
    }

    async fn replace(&self, path: &str, args: &[BusValue]) -> Result<BusValue, BusError> {
        if !self.object_exists(path) {
            return Err(unknown_object(path));
        }
        let pem = read_certificate_file(args).await?;

        let mut state = self.lock();
        let properties = state
            .objects
            .get_mut(path)
            .and_then(|object| object.interfaces.get_mut(CERTIFICATE_INTERFACE))
            .ok_or_else(|| unknown_object(path))?;
        properties.insert("CertificateString".to_string(), BusValue::String(pem));

        debug!(path = %path, "Replaced certificate");
        Ok(BusValue::Unit)
    }

    fn generate_csr(&self, manager_path: &str) -> Result<BusValue, BusError> {
        let csr_path = path_join(manager_path, "csr");
        let (delay, service) = {
            let state = self.lock();
            let manager = state
                .managers
                .get(manager_path)
                .ok_or_else(|| unknown_object(manager_path))?;
            (state.csr_delay, manager.domain.service_name())
        };

        if let Some(delay) = delay {
            let bus = self.clone();
            let manager_path = manager_path.to_string();
            let csr_path = csr_path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut interfaces = InterfaceMap::new();
                interfaces.insert(CSR_INTERFACE.to_string(), PropertyMap::new());

                let mut state = bus.lock();
                state.objects.insert(
                    csr_path.clone(),
                    BusObject {
                        service: service.to_string(),
                        interfaces: interfaces.clone(),
                    },
                );
                state.emit_interfaces_added(
                    &manager_path,
                    InterfacesAdded {
                        object_path: csr_path,
                        interfaces,
                    },
                );
            });
        }

        Ok(BusValue::ObjectPath(csr_path))
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn call(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<BusValue>,
    ) -> Result<BusValue, BusError> {
        {
            let mut state = self.lock();
            state.record(service, path, interface, method, args.clone());
            if let Some(err) = state.take_fault(method) {
                return Err(err);
            }
            let object_known =
                state.managers.contains_key(path) || state.object(service, path).is_ok();
            if !object_known {
                return Err(unknown_object(path));
            }
        }

        match (interface, method) {
            (INSTALL_INTERFACE, "Install") if self.is_manager(path) => {
                self.install(path, &args).await
            }
            (CSR_CREATE_INTERFACE, "GenerateCSR") if self.is_manager(path) => {
                self.generate_csr(path)
            }
            (REPLACE_INTERFACE, "Replace") => self.replace(path, &args).await,
            (DELETE_INTERFACE, "Delete") => {
                let mut state = self.lock();
                let implements_delete = state
                    .objects
                    .get(path)
                    .is_some_and(|object| object.interfaces.contains_key(DELETE_INTERFACE));
                if !implements_delete {
                    return Err(unknown_method(interface, method));
                }
                state.objects.remove(path);
                debug!(path = %path, "Deleted certificate");
                Ok(BusValue::Unit)
            }
            (CSR_INTERFACE, "CSR") => {
                let state = self.lock();
                state.object(service, path)?;
                Ok(BusValue::String(state.csr_text.clone()))
            }
            _ => Err(unknown_method(interface, method)),
        }
    }

    async fn get_all_properties(
        &self,
        service: &str,
        path: &str,
        interface: &str,
    ) -> Result<PropertyMap, BusError> {
        let mut state = self.lock();
        state.record(service, path, "org.freedesktop.DBus.Properties", "GetAll", vec![
            BusValue::from(interface),
        ]);
        if let Some(err) = state.take_fault("GetAll") {
            return Err(err);
        }

        state
            .object(service, path)?
            .interfaces
            .get(interface)
            .cloned()
            .ok_or_else(|| {
                BusError::from_error_name(
                    Some(UNKNOWN_INTERFACE_ERROR),
                    format!("{} does not implement {}", path, interface),
                )
            })
    }

    async fn get_subtree_paths(
        &self,
        base_path: &str,
        depth: u32,
        interfaces: &[&str],
    ) -> Result<Vec<String>, BusError> {
        let mut state = self.lock();
        state.record(
            "xyz.openbmc_project.ObjectMapper",
            "/xyz/openbmc_project/object_mapper",
            "xyz.openbmc_project.ObjectMapper",
            "GetSubTreePaths",
            vec![
                BusValue::from(base_path),
                BusValue::Int32(depth as i32),
                BusValue::StringList(interfaces.iter().map(|i| i.to_string()).collect()),
            ],
        );
        if let Some(err) = state.take_fault("GetSubTreePaths") {
            return Err(err);
        }

        let prefix = format!("{}/", base_path.trim_end_matches('/'));
        Ok(state
            .objects
            .iter()
            .filter_map(|(path, object)| {
                let rest = path.strip_prefix(prefix.as_str())?;
                let within_depth = depth == 0 || rest.split('/').count() <= depth as usize;
                let implements = interfaces.is_empty()
                    || interfaces
                        .iter()
                        .any(|iface| object.interfaces.contains_key(*iface));
                (within_depth && implements).then(|| path.clone())
            })
            .collect())
    }

    async fn subscribe(&self, rule: MatchRule) -> Result<Subscription, BusError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault("AddMatch") {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.push((rule.clone(), tx));
        state.subscriptions_opened += 1;
        debug!(rule = %rule, "Subscription added");
        Ok(Subscription::new(rule, rx))
    }
}

impl MemoryBus {
    fn is_manager(&self, path: &str) -> bool {
        self.lock().managers.contains_key(path)
    }
}

fn unknown_object(path: &str) -> BusError {
    BusError::from_error_name(Some(UNKNOWN_OBJECT_ERROR), format!("Unknown object '{}'", path))
}

fn unknown_method(interface: &str, method: &str) -> BusError {
    BusError::from_error_name(
        Some(UNKNOWN_METHOD_ERROR),
        format!("Unknown method '{}' on interface '{}'", method, interface),
    )
}

/// Read the certificate file named by the first argument, the way a manager
/// does at call time
async fn read_certificate_file(args: &[BusValue]) -> Result<String, BusError> {
    let file = args
        .first()
        .and_then(BusValue::as_str)
        .ok_or_else(|| {
            BusError::from_error_name(Some(INTERNAL_FAILURE_ERROR), "missing certificate path")
        })?;

    let pem = tokio::fs::read_to_string(file).await.map_err(|e| {
        BusError::from_error_name(
            Some(INTERNAL_FAILURE_ERROR),
            format!("failed to read {}: {}", file, e),
        )
    })?;

    if !pem.contains(PEM_CERTIFICATE_MARKER) {
        return Err(BusError::from_error_name(
            Some(INVALID_CERTIFICATE_ERROR),
            "Certificate is invalid",
        ));
    }
    Ok(pem)
}

fn certificate_object(domain: CertificateDomain, pem: &str) -> BusObject {
    let key_usage = match domain.expected_key_usage() {
        Some(usage) => vec!["DigitalSignature".to_string(), usage.to_string()],
        None => vec!["KeyCertSign".to_string()],
    };

    let mut properties = PropertyMap::new();
    properties.insert("CertificateString".to_string(), BusValue::from(pem));
    properties.insert("KeyUsage".to_string(), BusValue::StringList(key_usage));
    properties.insert("Issuer".to_string(), BusValue::from(DEFAULT_ISSUER));
    properties.insert("Subject".to_string(), BusValue::from(DEFAULT_SUBJECT));
    properties.insert(
        "ValidNotAfter".to_string(),
        BusValue::UInt64(DEFAULT_VALID_NOT_AFTER),
    );
    properties.insert(
        "ValidNotBefore".to_string(),
        BusValue::UInt64(DEFAULT_VALID_NOT_BEFORE),
    );

    let mut interfaces = InterfaceMap::new();
    interfaces.insert(CERTIFICATE_INTERFACE.to_string(), properties);
    interfaces.insert(REPLACE_INTERFACE.to_string(), PropertyMap::new());
    if domain.supports_delete() {
        interfaces.insert(DELETE_INTERFACE.to_string(), PropertyMap::new());
    }

    BusObject {
        service: domain.service_name().to_string(),
        interfaces,
    }
}
