//! Single-flight CSR generation
//!
//! The certificate managers generate a CSR asynchronously: the GenerateCSR
//! call only starts the work, and the result shows up later as a new object
//! announced through an `InterfacesAdded` signal. A session therefore
//! subscribes to that signal before issuing the call and then waits for
//! whichever comes first: the signal, a failed call, or the deadline.
//!
//! Only one session may exist at a time across all certificate domains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{GenerateCsrRequest, GenerateCsrResponse, ODataLink};
use crate::services::bus::{BusClient, BusValue, MatchRule};
use crate::services::certs::paths::{
    CertificateDomain, PathTranslator, CSR_CREATE_INTERFACE, CSR_INTERFACE,
};
use crate::utils::{AppError, AppResult};

const GENERATE_CSR_ACTION: &str = "GenerateCSR";
const RSA_KEY_BIT_LENGTH: i64 = 2048;
const SUPPORTED_KEY_PAIR_ALGORITHMS: [&str; 2] = ["EC", "RSA"];

/// A validated CSR request, ready to be sent to one certificate manager
#[derive(Debug, Clone, PartialEq)]
pub struct CsrPlan {
    pub domain: CertificateDomain,
    /// Collection URI as supplied by the caller, echoed in the response
    pub collection_uri: String,
    /// GenerateCSR arguments in method signature order
    pub args: Vec<BusValue>,
}

fn not_supported(parameter: &str) -> AppError {
    AppError::ActionParameterNotSupported {
        parameter: parameter.to_string(),
        action: GENERATE_CSR_ACTION.to_string(),
    }
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value.ok_or_else(|| AppError::PropertyMissing(name.to_string()))
}

/// Check a GenerateCSR request and resolve its target manager.
/// Nothing here touches the bus.
pub fn validate(paths: &PathTranslator, request: GenerateCsrRequest) -> AppResult<CsrPlan> {
    let collection_uri = request
        .certificate_collection
        .ok_or_else(|| AppError::PropertyMissing("CertificateCollection".to_string()))?
        .odata_id;
    let city = required(request.city, "City")?;
    let common_name = required(request.common_name, "CommonName")?;
    let country = required(request.country, "Country")?;
    let organization = required(request.organization, "Organization")?;
    let organizational_unit = required(request.organizational_unit, "OrganizationalUnit")?;
    let state = required(request.state, "State")?;

    // There is nowhere to keep a challenge password for the private key
    if !request.challenge_password.is_empty() {
        return Err(not_supported("ChallengePassword"));
    }

    let (domain, expected_usage) = paths
        .parse_collection_uri(&collection_uri)
        .and_then(|domain| Some((domain, domain.expected_key_usage()?)))
        .ok_or_else(|| not_supported("CertificateCollection"))?;

    if !SUPPORTED_KEY_PAIR_ALGORITHMS.contains(&request.key_pair_algorithm.as_str()) {
        return Err(not_supported("KeyPairAlgorithm"));
    }

    if request.key_pair_algorithm == "RSA" && request.key_bit_length != RSA_KEY_BIT_LENGTH {
        return Err(AppError::PropertyValueNotInList {
            property: "KeyBitLength".to_string(),
            value: request.key_bit_length.to_string(),
        });
    }

    let key_usage = match request.key_usage.as_slice() {
        [] => vec![expected_usage.to_string()],
        [usage] if usage == expected_usage => vec![usage.clone()],
        [usage] => {
            return Err(AppError::PropertyValueNotInList {
                property: "KeyUsage".to_string(),
                value: usage.clone(),
            })
        }
        _ => return Err(not_supported("KeyUsage")),
    };

    let args = vec![
        BusValue::StringList(request.alternative_names),
        BusValue::String(request.challenge_password),
        BusValue::String(city),
        BusValue::String(common_name),
        BusValue::String(request.contact_person),
        BusValue::String(country),
        BusValue::String(request.email),
        BusValue::String(request.given_name),
        BusValue::String(request.initials),
        BusValue::Int64(request.key_bit_length),
        BusValue::String(request.key_curve_id),
        BusValue::String(request.key_pair_algorithm),
        BusValue::StringList(key_usage),
        BusValue::String(organization),
        BusValue::String(organizational_unit),
        BusValue::String(state),
        BusValue::String(request.surname),
        BusValue::String(request.unstructured_name),
    ];

    Ok(CsrPlan {
        domain,
        collection_uri,
        args,
    })
}

/// The live session occupying the slot
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub id: Uuid,
    pub domain: CertificateDomain,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum SlotState {
    Idle,
    Active(SessionHandle),
}

/// Releases the slot when the session ends, however it ends
struct SlotGuard {
    slot: Arc<Mutex<SlotState>>,
    id: Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*slot, SlotState::Active(handle) if handle.id == self.id) {
            *slot = SlotState::Idle;
            debug!(session = %self.id, "CSR slot released");
        }
    }
}

#[derive(Debug, Default)]
struct CsrCounters {
    started: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    rejected_busy: AtomicU64,
}

/// Session outcome counters
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CsrStats {
    pub started: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub rejected_busy: u64,
}

/// Slot state as reported by health checks
#[derive(Debug, Clone, Serialize)]
pub struct CsrSlotStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionHandle>,
}

/// Owns the single CSR slot and runs sessions
pub struct CsrCoordinator {
    bus: Arc<dyn BusClient>,
    paths: PathTranslator,
    timeout: Duration,
    slot: Arc<Mutex<SlotState>>,
    counters: Arc<CsrCounters>,
}

impl CsrCoordinator {
    pub fn new(bus: Arc<dyn BusClient>, paths: PathTranslator, timeout: Duration) -> Self {
        Self {
            bus,
            paths,
            timeout,
            slot: Arc::new(Mutex::new(SlotState::Idle)),
            counters: Arc::new(CsrCounters::default()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, SlotState> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retry_after_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    pub fn state(&self) -> CsrSlotStatus {
        match &*self.lock_slot() {
            SlotState::Idle => CsrSlotStatus {
                active: false,
                session: None,
            },
            SlotState::Active(handle) => CsrSlotStatus {
                active: true,
                session: Some(handle.clone()),
            },
        }
    }

    pub fn stats(&self) -> CsrStats {
        CsrStats {
            started: self.counters.started.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected_busy: self.counters.rejected_busy.load(Ordering::Relaxed),
        }
    }

    /// Take the slot, or report when a session is already live
    fn try_acquire(&self, domain: CertificateDomain) -> AppResult<SlotGuard> {
        let mut slot = self.lock_slot();
        if let SlotState::Active(handle) = &*slot {
            self.counters.rejected_busy.fetch_add(1, Ordering::Relaxed);
            warn!(session = %handle.id, "CSR generation already in progress");
            return Err(AppError::ServiceTemporarilyUnavailable {
                retry_after_secs: self.retry_after_secs(),
            });
        }

        let handle = SessionHandle {
            id: Uuid::new_v4(),
            domain,
            started_at: Utc::now(),
        };
        let id = handle.id;
        *slot = SlotState::Active(handle);
        Ok(SlotGuard {
            slot: Arc::clone(&self.slot),
            id,
        })
    }

    /// Validate the request and run one CSR session to completion.
    ///
    /// The session runs on its own task, so it reaches a terminal state and
    /// frees the slot even if the caller goes away.
    pub async fn generate(&self, request: GenerateCsrRequest) -> AppResult<GenerateCsrResponse> {
        let plan = validate(&self.paths, request)?;
        let guard = self.try_acquire(plan.domain)?;
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        info!(session = %guard.id, domain = ?plan.domain, "CSR session started");

        let session = Session {
            bus: Arc::clone(&self.bus),
            counters: Arc::clone(&self.counters),
            timeout: self.timeout,
            retry_after_secs: self.retry_after_secs(),
            plan,
            guard,
        };

        tokio::spawn(session.run())
            .await
            .map_err(|e| AppError::Internal(format!("CSR session task failed: {}", e)))?
    }
}

struct Session {
    bus: Arc<dyn BusClient>,
    counters: Arc<CsrCounters>,
    timeout: Duration,
    retry_after_secs: u64,
    plan: CsrPlan,
    guard: SlotGuard,
}

impl Session {
    async fn run(self) -> AppResult<GenerateCsrResponse> {
        let session_id = self.guard.id;
        let result = self.execute().await;
        match &result {
            Ok(_) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(session = %session_id, "CSR session completed");
            }
            Err(AppError::ServiceTemporarilyUnavailable { .. }) => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                error!(session = %session_id, "Timed out waiting for CSR generation");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(session = %session_id, error = %e, "CSR session failed");
            }
        }
        // The guard drops with self, freeing the slot
        result
    }

    async fn execute(&self) -> AppResult<GenerateCsrResponse> {
        let domain = self.plan.domain;
        let service = domain.service_name();
        let manager_path = domain.object_path();

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let rule = MatchRule::interfaces_added(manager_path);
        debug!(rule = %rule, "Subscribing for CSR completion");
        let mut subscription = self
            .bus
            .subscribe(rule)
            .await
            .map_err(|e| AppError::Internal(format!("failed to subscribe: {}", e)))?;

        let mut generate = self.bus.call(
            service,
            manager_path,
            CSR_CREATE_INTERFACE,
            "GenerateCSR",
            self.plan.args.clone(),
        );
        let mut generate_pending = true;

        let csr_path = loop {
            tokio::select! {
                biased;

                event = subscription.next() => match event {
                    Some(event) if event.has_interface(CSR_INTERFACE) => {
                        debug!(path = %event.object_path, "CSR object added");
                        break event.object_path;
                    }
                    Some(event) => {
                        debug!(path = %event.object_path, "Ignoring non-CSR object");
                    }
                    None => {
                        return Err(AppError::Internal("CSR subscription closed".to_string()));
                    }
                },

                reply = &mut generate, if generate_pending => {
                    generate_pending = false;
                    if let Err(e) = reply {
                        return Err(AppError::Internal(format!("GenerateCSR failed: {}", e)));
                    }
                },

                () = &mut deadline => {
                    return Err(AppError::ServiceTemporarilyUnavailable {
                        retry_after_secs: self.retry_after_secs,
                    });
                }
            }
        };
        drop(subscription);

        let csr = self
            .bus
            .call(service, &csr_path, CSR_INTERFACE, "CSR", vec![])
            .await
            .map_err(|e| AppError::Internal(format!("failed to read CSR: {}", e)))?;

        match csr.as_str() {
            Some(text) if !text.is_empty() => Ok(GenerateCsrResponse {
                csr_string: text.to_string(),
                certificate_collection: ODataLink::new(self.plan.collection_uri.clone()),
            }),
            Some(_) => Err(AppError::Internal("CSR read is empty".to_string())),
            None => Err(AppError::Internal(format!(
                "CSR returned {} instead of a string",
                csr.type_name()
            ))),
        }
    }
}
