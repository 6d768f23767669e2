//! The capability interface applications program against.
//!
//! Every platform, including the unsupported fallback, implements
//! `HealthService`. Call sites never branch on the platform; they only see
//! typed results, empty lists, `false` and `None`. Cancellation is the one
//! failure that is reported as an error.

use crate::activity::ActivityType;
use crate::codec::MetricCodec;
use crate::config::Config;
use crate::error::Cancelled;
use crate::permissions::{negotiate, PermissionGateway};
use crate::platform::HostPlatform;
use crate::query::{NativeStore, QueryEngine, DEFAULT_PAGE_SIZE};
use crate::session::WorkoutSessionMachine;
use crate::time_range::HealthTimeRange;
use crate::types::{
    HealthMetric, HealthPermission, HealthRecord, MetricKind, PermissionError, PermissionResult,
    Workout,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

type Outcome<T> = std::result::Result<T, Cancelled>;

/// Health data capabilities of one host platform
#[async_trait]
pub trait HealthService: Send + Sync {
    fn platform(&self) -> HostPlatform;

    /// Capability check, no side effects
    fn is_supported(&self) -> bool;

    async fn request_permissions(
        &self,
        permissions: &[HealthPermission],
        include_full_history: bool,
        cancel: &CancellationToken,
    ) -> Outcome<PermissionResult>;

    /// Records of `kind` in `range`; empty on any failure
    async fn read_records(
        &self,
        kind: MetricKind,
        range: &HealthTimeRange,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<HealthRecord>>;

    async fn write_record(&self, record: &HealthRecord, cancel: &CancellationToken)
        -> Outcome<bool>;

    async fn start_workout_session(
        &self,
        activity: ActivityType,
        cancel: &CancellationToken,
    ) -> Outcome<bool>;

    /// The saved workout, or `None` if nothing was running or it could not
    /// be saved
    async fn end_workout_session(&self, cancel: &CancellationToken) -> Outcome<Option<Workout>>;

    fn is_workout_session_active(&self) -> bool;
}

/// Typed conveniences over `HealthService`
#[async_trait]
pub trait HealthServiceExt: HealthService {
    async fn get_health_data<M: HealthMetric>(
        &self,
        range: &HealthTimeRange,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<M>> {
        let records = self.read_records(M::KIND, range, cancel).await?;
        Ok(records.into_iter().filter_map(M::from_record).collect())
    }

    async fn write_health_data<M: HealthMetric>(
        &self,
        metric: M,
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        self.write_record(&metric.into_record(), cancel).await
    }

    async fn request_permission(
        &self,
        permission: HealthPermission,
        cancel: &CancellationToken,
    ) -> Outcome<PermissionResult> {
        self.request_permissions(&[permission], false, cancel).await
    }
}

impl<T: HealthService + ?Sized> HealthServiceExt for T {}

/// A platform's permission gateway, codec and native store, bundled
pub trait HealthBackend: Send + Sync + 'static {
    type Gateway: PermissionGateway;
    type Codec: MetricCodec;
    type Store: NativeStore<<Self::Codec as MetricCodec>::Native>;

    fn platform(&self) -> HostPlatform;

    fn gateway(&self) -> &Self::Gateway;

    fn codec(&self) -> &Self::Codec;

    fn store(&self) -> &Self::Store;

    /// Whether the platform offers live workout sessions
    fn live_sessions(&self) -> bool;
}

/// Settings that shape a platform service
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceSettings {
    pub data_origin: String,
    pub page_size: usize,
    pub full_history: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            data_origin: "vitals".into(),
            page_size: DEFAULT_PAGE_SIZE,
            full_history: false,
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            data_origin: config.app.identifier.clone(),
            page_size: config.query.page_size,
            full_history: config.permissions.request_full_history,
        }
    }
}

/// `HealthService` over any backend
pub struct PlatformHealthService<B: HealthBackend> {
    backend: B,
    sessions: WorkoutSessionMachine,
    settings: ServiceSettings,
}

impl<B: HealthBackend> PlatformHealthService<B> {
    pub fn new(backend: B, settings: ServiceSettings) -> Self {
        let sessions = if backend.live_sessions() {
            WorkoutSessionMachine::new()
        } else {
            WorkoutSessionMachine::unavailable()
        };
        Self {
            backend,
            sessions,
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn engine(&self) -> QueryEngine<'_, B> {
        QueryEngine::new(&self.backend)
            .with_page_size(self.settings.page_size)
            .with_full_history(self.settings.full_history)
    }
}

#[async_trait]
impl<B: HealthBackend> HealthService for PlatformHealthService<B> {
    fn platform(&self) -> HostPlatform {
        self.backend.platform()
    }

    fn is_supported(&self) -> bool {
        self.backend.gateway().is_available()
    }

    async fn request_permissions(
        &self,
        permissions: &[HealthPermission],
        include_full_history: bool,
        cancel: &CancellationToken,
    ) -> Outcome<PermissionResult> {
        negotiate(
            self.backend.gateway(),
            permissions,
            include_full_history,
            cancel,
        )
        .await
    }

    async fn read_records(
        &self,
        kind: MetricKind,
        range: &HealthTimeRange,
        cancel: &CancellationToken,
    ) -> Outcome<Vec<HealthRecord>> {
        if !self.is_supported() {
            return Ok(Vec::new());
        }
        self.engine().fetch(kind, range, cancel).await
    }

    async fn write_record(
        &self,
        record: &HealthRecord,
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        if !self.is_supported() {
            return Ok(false);
        }
        self.engine().write(record, cancel).await
    }

    async fn start_workout_session(
        &self,
        activity: ActivityType,
        cancel: &CancellationToken,
    ) -> Outcome<bool> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if !self.is_supported() {
            return Ok(false);
        }
        Ok(self.sessions.start(activity))
    }

    async fn end_workout_session(&self, cancel: &CancellationToken) -> Outcome<Option<Workout>> {
        let engine = self.engine();
        self.sessions
            .end(&self.settings.data_origin, |workout| async move {
                engine.write(&HealthRecord::Workout(workout), cancel).await
            })
            .await
    }

    fn is_workout_session_active(&self) -> bool {
        self.sessions.is_active()
    }
}

/// Service for hosts without a health store
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedHealthService;

#[async_trait]
impl HealthService for UnsupportedHealthService {
    fn platform(&self) -> HostPlatform {
        HostPlatform::Unsupported
    }

    fn is_supported(&self) -> bool {
        false
    }

    async fn request_permissions(
        &self,
        _permissions: &[HealthPermission],
        _include_full_history: bool,
        _cancel: &CancellationToken,
    ) -> Outcome<PermissionResult> {
        Ok(PermissionResult::failure(PermissionError::NotSupported))
    }

    async fn read_records(
        &self,
        _kind: MetricKind,
        _range: &HealthTimeRange,
        _cancel: &CancellationToken,
    ) -> Outcome<Vec<HealthRecord>> {
        Ok(Vec::new())
    }

    async fn write_record(
        &self,
        _record: &HealthRecord,
        _cancel: &CancellationToken,
    ) -> Outcome<bool> {
        Ok(false)
    }

    async fn start_workout_session(
        &self,
        _activity: ActivityType,
        _cancel: &CancellationToken,
    ) -> Outcome<bool> {
        Ok(false)
    }

    async fn end_workout_session(&self, _cancel: &CancellationToken) -> Outcome<Option<Workout>> {
        Ok(None)
    }

    fn is_workout_session_active(&self) -> bool {
        false
    }
}
