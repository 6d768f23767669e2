//! Permission negotiation.
//!
//! The negotiator asks the platform for the smallest possible prompt: it
//! expands the requested permissions into platform identifiers, subtracts the
//! identifiers already granted, and prompts once for whatever is left. If
//! nothing is missing the user is never prompted.

use crate::error::{until_cancelled, Cancelled};
use crate::types::{HealthPermission, PermissionError, PermissionResult};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Platform side of permission negotiation
#[async_trait]
pub trait PermissionGateway: Send + Sync {
    /// SDK presence check, no side effects
    fn is_available(&self) -> bool;

    /// Platform identifiers needed for one permission request
    fn identifiers(&self, permission: &HealthPermission) -> Vec<String>;

    /// Identifier unlocking history beyond the default retention window
    fn full_history_identifier(&self) -> Option<String> {
        None
    }

    /// Whether `granted` reports read grants truthfully.
    ///
    /// Platforms that hide read grants for privacy report `false`; a
    /// successful negotiation there only means the prompt was shown.
    fn read_status_observable(&self) -> bool {
        true
    }

    /// Identifiers currently granted
    async fn granted(&self) -> Result<HashSet<String>>;

    /// Present one consolidated prompt for `missing` and return the granted
    /// set once the user has answered.
    async fn prompt(&self, missing: &[String]) -> Result<HashSet<String>>;
}

/// Platform identifiers for `requested`, de-duplicated in request order
pub fn expand<G: PermissionGateway + ?Sized>(
    gateway: &G,
    requested: &[HealthPermission],
    include_full_history: bool,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();

    let full_history = if include_full_history {
        gateway.full_history_identifier()
    } else {
        None
    };

    let expanded = requested
        .iter()
        .flat_map(|permission| gateway.identifiers(permission))
        .chain(full_history);

    for id in expanded {
        if seen.insert(id.clone()) {
            identifiers.push(id);
        }
    }
    identifiers
}

/// Negotiate `requested` with the platform.
///
/// Only cancellation escapes as an error; every other outcome is a
/// `PermissionResult`.
pub async fn negotiate<G: PermissionGateway + ?Sized>(
    gateway: &G,
    requested: &[HealthPermission],
    include_full_history: bool,
    cancel: &CancellationToken,
) -> std::result::Result<PermissionResult, Cancelled> {
    if !gateway.is_available() {
        tracing::debug!("Permission request on a platform without a health store");
        return Ok(PermissionResult::failure(PermissionError::NotSupported));
    }

    let wanted = expand(gateway, requested, include_full_history);

    let granted = match until_cancelled(cancel, gateway.granted()).await? {
        Ok(granted) => granted,
        Err(e) => {
            tracing::warn!("Failed to fetch granted permissions: {}", e);
            return Ok(PermissionResult::failure(
                PermissionError::ProblemFetchingGranted(e.to_string()),
            ));
        }
    };

    let missing: Vec<String> = wanted
        .into_iter()
        .filter(|id| !granted.contains(id))
        .collect();

    if missing.is_empty() {
        tracing::debug!("All requested permissions already granted");
        return Ok(PermissionResult::success());
    }

    tracing::info!("Requesting {} missing permissions", missing.len());
    let after = match until_cancelled(cancel, gateway.prompt(&missing)).await? {
        Ok(after) => after,
        Err(e) => {
            tracing::warn!("Permission prompt failed: {}", e);
            return Ok(PermissionResult::failure(PermissionError::GrantError(
                e.to_string(),
            )));
        }
    };

    let denied: Vec<String> = missing
        .into_iter()
        .filter(|id| !after.contains(id))
        .collect();

    if denied.is_empty() {
        if !gateway.read_status_observable() {
            tracing::debug!("Read grants are not observable here; prompt was shown");
        }
        Ok(PermissionResult::success())
    } else {
        tracing::info!("Permissions still missing after prompt: {:?}", denied);
        Ok(PermissionResult::failure(PermissionError::MissingPermissions(
            denied,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HealthDataType, PermissionType};
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeGateway {
        unavailable: bool,
        fail_granted: bool,
        fail_prompt: bool,
        granted: Mutex<HashSet<String>>,
        deny: HashSet<String>,
        prompts: AtomicUsize,
        last_prompt: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn with_granted(ids: &[&str]) -> Self {
            let gw = Self::default();
            gw.granted
                .lock()
                .unwrap()
                .extend(ids.iter().map(|s| s.to_string()));
            gw
        }
    }

    #[async_trait]
    impl PermissionGateway for FakeGateway {
        fn is_available(&self) -> bool {
            !self.unavailable
        }

        fn identifiers(&self, permission: &HealthPermission) -> Vec<String> {
            let name = format!("{:?}", permission.data_type).to_uppercase();
            let mut ids = Vec::new();
            if permission.permission_type.contains(PermissionType::READ) {
                ids.push(format!("READ_{}", name));
            }
            if permission.permission_type.contains(PermissionType::WRITE) {
                ids.push(format!("WRITE_{}", name));
            }
            ids
        }

        fn full_history_identifier(&self) -> Option<String> {
            Some("READ_HISTORY".into())
        }

        async fn granted(&self) -> Result<HashSet<String>> {
            if self.fail_granted {
                return Err(Error::PermissionFetch("binder died".into()));
            }
            Ok(self.granted.lock().unwrap().clone())
        }

        async fn prompt(&self, missing: &[String]) -> Result<HashSet<String>> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = missing.to_vec();
            if self.fail_prompt {
                return Err(Error::PlatformGrant("activity gone".into()));
            }
            let mut granted = self.granted.lock().unwrap();
            for id in missing {
                if !self.deny.contains(id) {
                    granted.insert(id.clone());
                }
            }
            Ok(granted.clone())
        }
    }

    fn steps_read() -> HealthPermission {
        HealthPermission::read(HealthDataType::Steps)
    }

    #[tokio::test]
    async fn test_no_prompt_when_already_granted() {
        let gw = FakeGateway::with_granted(&["READ_STEPS", "READ_WEIGHT"]);
        let requested = [steps_read(), HealthPermission::read(HealthDataType::Weight)];
        let result = negotiate(&gw, &requested, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(gw.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompts_once_for_exact_missing_set() {
        let gw = FakeGateway::with_granted(&["READ_STEPS"]);
        let requested = [
            steps_read(),
            HealthPermission::new(
                HealthDataType::HeartRate,
                PermissionType::READ | PermissionType::WRITE,
            ),
        ];
        let result = negotiate(&gw, &requested, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(gw.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(
            *gw.last_prompt.lock().unwrap(),
            vec!["READ_HEARTRATE".to_string(), "WRITE_HEARTRATE".to_string()]
        );

        // Second negotiation finds everything granted
        negotiate(&gw, &requested, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(gw.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_identifiers_reported() {
        let mut gw = FakeGateway::default();
        gw.deny.insert("WRITE_WEIGHT".into());
        let requested = [HealthPermission::new(
            HealthDataType::Weight,
            PermissionType::READ | PermissionType::WRITE,
        )];
        let result = negotiate(&gw, &requested, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            result.error,
            Some(PermissionError::MissingPermissions(vec![
                "WRITE_WEIGHT".into()
            ]))
        );
        assert_eq!(result.denied_permissions(), &["WRITE_WEIGHT".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_supported() {
        let gw = FakeGateway {
            unavailable: true,
            ..Default::default()
        };
        let result = negotiate(&gw, &[steps_read()], false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.error, Some(PermissionError::NotSupported));
    }

    #[tokio::test]
    async fn test_fetch_failure_maps_to_problem_fetching() {
        let gw = FakeGateway {
            fail_granted: true,
            ..Default::default()
        };
        let result = negotiate(&gw, &[steps_read()], false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            result.error,
            Some(PermissionError::ProblemFetchingGranted(_))
        ));
        assert_eq!(gw.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_failure_maps_to_grant_error() {
        let gw = FakeGateway {
            fail_prompt: true,
            ..Default::default()
        };
        let result = negotiate(&gw, &[steps_read()], false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result.error, Some(PermissionError::GrantError(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_prompt() {
        let gw = FakeGateway::default();
        let token = CancellationToken::new();
        token.cancel();
        let result = negotiate(&gw, &[steps_read()], false, &token).await;
        assert_eq!(result, Err(Cancelled));
        assert_eq!(gw.prompts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_expand_dedups_and_appends_history() {
        let gw = FakeGateway::default();
        let requested = [steps_read(), steps_read(), HealthPermission::write(HealthDataType::Steps)];
        assert_eq!(
            expand(&gw, &requested, true),
            vec!["READ_STEPS", "WRITE_STEPS", "READ_HISTORY"]
        );
        assert_eq!(expand(&gw, &requested, false).len(), 2);
    }
}
