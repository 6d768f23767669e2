//! Host platform detection and service selection.

pub mod health_connect;
pub mod healthkit;

use crate::service::{
    HealthBackend, HealthService, PlatformHealthService, ServiceSettings, UnsupportedHealthService,
};
use crate::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Host platform identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPlatform {
    Android,
    Ios,
    Unsupported,
}

impl HostPlatform {
    /// Platform of the running process
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "android" => HostPlatform::Android,
            "ios" => HostPlatform::Ios,
            _ => HostPlatform::Unsupported,
        }
    }

    /// Name of the health store behind this platform
    pub fn store_name(&self) -> &'static str {
        match self {
            HostPlatform::Android => "Health Connect",
            HostPlatform::Ios => "HealthKit",
            HostPlatform::Unsupported => "none",
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostPlatform::Android => "android",
            HostPlatform::Ios => "ios",
            HostPlatform::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Pick the one service implementation for `platform`.
///
/// Backends are built lazily so only the selected one is ever constructed.
pub fn select_service<A, I>(
    platform: HostPlatform,
    android: impl FnOnce() -> Result<A>,
    ios: impl FnOnce() -> Result<I>,
    settings: ServiceSettings,
) -> Result<Arc<dyn HealthService>>
where
    A: HealthBackend,
    I: HealthBackend,
{
    tracing::debug!("Selecting health service for {}", platform);
    let service: Arc<dyn HealthService> = match platform {
        HostPlatform::Android => Arc::new(PlatformHealthService::new(android()?, settings)),
        HostPlatform::Ios => Arc::new(PlatformHealthService::new(ios()?, settings)),
        HostPlatform::Unsupported => Arc::new(UnsupportedHealthService),
    };
    Ok(service)
}
