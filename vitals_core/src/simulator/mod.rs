//! Simulated platform stores.
//!
//! `SimulatedHealthConnect` and `SimulatedHealthKit` stand in for the phone
//! so the full pipeline runs on a desktop: records live in memory and,
//! when opened on a data directory, in a JSONL journal next to a grant state
//! file. Fault knobs let tests drive every failure path.

mod grants;
mod journal;

pub use grants::GrantState;
pub use journal::Journal;

use crate::error::Error;
use crate::platform::health_connect::{HcRecord, HealthConnectClient, SdkStatus};
use crate::platform::healthkit::{
    type_identifier, AuthorizationStatus, HealthStore, HkSample,
};
use crate::query::{NativeStore, ReadPage, ReadRequest};
use crate::types::MetricKind;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const HEALTH_CONNECT_JOURNAL: &str = "health_connect.jsonl";
const HEALTH_CONNECT_GRANTS: &str = "health_connect_grants.json";
const HEALTHKIT_JOURNAL: &str = "healthkit.jsonl";
const HEALTHKIT_GRANTS: &str = "healthkit_grants.json";

/// Failure injection for the simulated stores
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// SDK reports itself unavailable
    pub unavailable: bool,
    pub fail_granted: bool,
    pub fail_prompt: bool,
    pub fail_reads: bool,
    /// Fail reads of one kind only
    pub fail_reads_of: Option<MetricKind>,
    pub fail_writes: bool,
    /// Added before every read completes
    pub read_delay: Option<Duration>,
}

/// What the simulator needs to know about a native record
pub trait SimulatedRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn kind(&self) -> MetricKind;

    fn span(&self) -> (DateTime<Utc>, DateTime<Utc>);

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);
}

impl SimulatedRecord for HcRecord {
    fn kind(&self) -> MetricKind {
        HcRecord::kind(self)
    }

    fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        HcRecord::span(self)
    }

    fn id(&self) -> &str {
        &self.metadata().id
    }

    fn set_id(&mut self, id: String) {
        self.metadata_mut().id = id;
    }
}

impl SimulatedRecord for HkSample {
    fn kind(&self) -> MetricKind {
        let type_id = self.type_identifier();
        MetricKind::ALL
            .into_iter()
            .find(|kind| type_identifier(kind.data_type()) == type_id)
            .unwrap_or(MetricKind::Workout)
    }

    fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        HkSample::span(self)
    }

    fn id(&self) -> &str {
        self.uuid()
    }

    fn set_id(&mut self, id: String) {
        self.set_uuid(id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record storage, grant state and fault knobs shared by both simulators
struct SimStore<R: SimulatedRecord> {
    records: Mutex<Vec<R>>,
    journal: Option<Journal>,
    grants: Mutex<GrantState>,
    grants_path: Option<PathBuf>,
    deny: BTreeSet<String>,
    faults: Mutex<Faults>,
    prompts: AtomicUsize,
}

impl<R: SimulatedRecord> SimStore<R> {
    fn in_memory() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            journal: None,
            grants: Mutex::new(GrantState::default()),
            grants_path: None,
            deny: BTreeSet::new(),
            faults: Mutex::new(Faults::default()),
            prompts: AtomicUsize::new(0),
        }
    }

    fn open(dir: &Path, journal_name: &str, grants_name: &str) -> Result<Self> {
        let journal = Journal::new(dir.join(journal_name));
        let grants_path = dir.join(grants_name);
        let records: Vec<R> = journal.read_all()?;
        let grants = GrantState::load(&grants_path)?;
        tracing::debug!(
            "Opened simulated store at {:?} with {} records",
            dir,
            records.len()
        );
        Ok(Self {
            records: Mutex::new(records),
            journal: Some(journal),
            grants: Mutex::new(grants),
            grants_path: Some(grants_path),
            ..Self::in_memory()
        })
    }

    fn faults(&self) -> Faults {
        lock(&self.faults).clone()
    }

    fn grants(&self) -> GrantState {
        lock(&self.grants).clone()
    }

    /// Apply a prompt answer and persist it
    fn answer_prompt(&self, identifiers: &[String]) -> Result<GrantState> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.faults().fail_prompt {
            return Err(Error::PlatformGrant("permission activity was destroyed".into()));
        }
        let snapshot = {
            let mut grants = lock(&self.grants);
            grants.answer_prompt(identifiers, &self.deny);
            grants.clone()
        };
        if let Some(path) = &self.grants_path {
            snapshot.save(path)?;
        }
        Ok(snapshot)
    }

    async fn read(&self, request: &ReadRequest) -> Result<ReadPage<R>> {
        let faults = self.faults();
        if let Some(delay) = faults.read_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_reads || faults.fail_reads_of == Some(request.kind) {
            return Err(Error::Store("remote store read failed".into()));
        }

        let start = request.window.start_utc();
        let end = request.window.end_utc();
        let mut matching: Vec<R> = lock(&self.records)
            .iter()
            .filter(|r| r.kind() == request.kind)
            .filter(|r| {
                let (s, e) = r.span();
                s <= end && e >= start
            })
            .cloned()
            .collect();

        matching.sort_by_key(|r| r.span().0);
        if !request.ascending {
            matching.reverse();
        }

        let offset = match &request.page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Store(format!("invalid page token {}", token)))?,
            None => 0,
        };
        let total = matching.len();
        let records: Vec<R> = matching
            .into_iter()
            .skip(offset)
            .take(request.page_size)
            .collect();
        let next = offset + records.len();
        let next_page_token = (next < total).then(|| next.to_string());

        Ok(ReadPage {
            records,
            next_page_token,
        })
    }

    fn insert(&self, mut record: R) -> Result<String> {
        if self.faults().fail_writes {
            return Err(Error::Write("remote store rejected the insert".into()));
        }
        if record.id().is_empty() {
            record.set_id(uuid::Uuid::new_v4().to_string());
        }
        let id = record.id().to_string();
        if let Some(journal) = &self.journal {
            journal.append(&record)?;
        }
        lock(&self.records).push(record);
        Ok(id)
    }

    fn len(&self) -> usize {
        lock(&self.records).len()
    }
}

macro_rules! simulator_common {
    ($sim:ident, $record:ty, $journal:expr, $grants:expr) => {
        impl $sim {
            /// Store that lives only in memory
            pub fn in_memory() -> Self {
                Self {
                    inner: SimStore::in_memory(),
                }
            }

            /// Store persisted under `dir`
            pub fn open(dir: &Path) -> Result<Self> {
                Ok(Self {
                    inner: SimStore::open(dir, $journal, $grants)?,
                })
            }

            /// Identifiers the simulated user declines when prompted
            pub fn with_deny<I, S>(mut self, deny: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.inner.deny = deny.into_iter().map(Into::into).collect();
                self
            }

            pub fn with_faults(self, faults: Faults) -> Self {
                self.set_faults(faults);
                self
            }

            pub fn set_faults(&self, faults: Faults) {
                *lock(&self.inner.faults) = faults;
            }

            /// Pre-grant identifiers without prompting
            pub fn grant<I, S>(&self, identifiers: I)
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                let mut grants = lock(&self.inner.grants);
                for id in identifiers {
                    let id = id.into();
                    grants.requested.insert(id.clone());
                    grants.granted.insert(id);
                }
            }

            /// Insert natives directly, bypassing permissions
            pub fn seed<I>(&self, records: I) -> Result<Vec<String>>
            where
                I: IntoIterator<Item = $record>,
            {
                records
                    .into_iter()
                    .map(|record| self.inner.insert(record))
                    .collect()
            }

            /// Number of permission prompts shown so far
            pub fn prompt_count(&self) -> usize {
                self.inner.prompts.load(Ordering::SeqCst)
            }

            pub fn record_count(&self) -> usize {
                self.inner.len()
            }

            pub fn grant_state(&self) -> GrantState {
                self.inner.grants()
            }
        }
    };
}

// ============================================================================
// Health Connect
// ============================================================================

/// In-process stand-in for a Health Connect client
pub struct SimulatedHealthConnect {
    inner: SimStore<HcRecord>,
}

simulator_common!(
    SimulatedHealthConnect,
    HcRecord,
    HEALTH_CONNECT_JOURNAL,
    HEALTH_CONNECT_GRANTS
);

#[async_trait]
impl NativeStore<HcRecord> for SimulatedHealthConnect {
    async fn read(&self, request: ReadRequest) -> Result<ReadPage<HcRecord>> {
        self.inner.read(&request).await
    }

    async fn insert(&self, record: HcRecord) -> Result<String> {
        self.inner.insert(record)
    }
}

#[async_trait]
impl HealthConnectClient for SimulatedHealthConnect {
    fn sdk_status(&self) -> SdkStatus {
        if self.inner.faults().unavailable {
            SdkStatus::Unavailable
        } else {
            SdkStatus::Available
        }
    }

    async fn granted_permissions(&self) -> Result<HashSet<String>> {
        if self.inner.faults().fail_granted {
            return Err(Error::PermissionFetch("permission controller unavailable".into()));
        }
        Ok(self.inner.grants().granted.into_iter().collect())
    }

    async fn request_permissions(&self, permissions: &[String]) -> Result<HashSet<String>> {
        let grants = self.inner.answer_prompt(permissions)?;
        Ok(grants.granted.into_iter().collect())
    }
}

// ============================================================================
// HealthKit
// ============================================================================

/// In-process stand-in for an `HKHealthStore`
pub struct SimulatedHealthKit {
    inner: SimStore<HkSample>,
}

simulator_common!(
    SimulatedHealthKit,
    HkSample,
    HEALTHKIT_JOURNAL,
    HEALTHKIT_GRANTS
);

#[async_trait]
impl NativeStore<HkSample> for SimulatedHealthKit {
    async fn read(&self, request: ReadRequest) -> Result<ReadPage<HkSample>> {
        // A declined read looks exactly like an empty store
        let read_id = format!("read:{}", type_identifier(request.kind.data_type()));
        let grants = self.inner.grants();
        if grants.requested.contains(&read_id) && !grants.granted.contains(&read_id) {
            return Ok(ReadPage::empty());
        }
        self.inner.read(&request).await
    }

    async fn insert(&self, record: HkSample) -> Result<String> {
        self.inner.insert(record)
    }
}

#[async_trait]
impl HealthStore for SimulatedHealthKit {
    fn is_health_data_available(&self) -> bool {
        !self.inner.faults().unavailable
    }

    fn authorization_status(&self, type_identifier: &str) -> AuthorizationStatus {
        let share_id = format!("share:{}", type_identifier);
        let grants = self.inner.grants();
        if grants.granted.contains(&share_id) {
            AuthorizationStatus::SharingAuthorized
        } else if grants.requested.contains(&share_id) {
            AuthorizationStatus::SharingDenied
        } else {
            AuthorizationStatus::NotDetermined
        }
    }

    fn read_authorization_requested(&self, type_identifier: &str) -> bool {
        self.inner
            .grants()
            .requested
            .contains(&format!("read:{}", type_identifier))
    }

    async fn request_authorization(&self, share: &[String], read: &[String]) -> Result<()> {
        let identifiers: Vec<String> = share
            .iter()
            .map(|t| format!("share:{}", t))
            .chain(read.iter().map(|t| format!("read:{}", t)))
            .collect();
        self.inner.answer_prompt(&identifiers)?;
        Ok(())
    }
}
