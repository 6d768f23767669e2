//! Workout session bookkeeping.
//!
//! A session is `Idle` or `Active`. Ending a session always returns the
//! machine to `Idle`, whether or not the resulting workout could be saved.
//! The lock is never held across an await.

use crate::activity::ActivityType;
use crate::error::Cancelled;
use crate::types::Workout;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Current session state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active {
        started_at: DateTime<Utc>,
        activity: ActivityType,
    },
}

/// Session lifecycle guarded by a single lock
#[derive(Debug)]
pub struct WorkoutSessionMachine {
    state: Mutex<SessionState>,
    live: bool,
}

impl Default for WorkoutSessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkoutSessionMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            live: true,
        }
    }

    /// Machine for a platform without a live-session API: `start` is always
    /// `false` and `end` always `None`.
    pub fn unavailable() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            live: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, activity: ActivityType) -> bool {
        self.start_at(activity, Utc::now())
    }

    /// Become `Active` unless a session is already running
    pub fn start_at(&self, activity: ActivityType, now: DateTime<Utc>) -> bool {
        if !self.live {
            tracing::debug!("Live workout sessions are not available");
            return false;
        }
        let mut state = self.lock();
        if let SessionState::Active { .. } = *state {
            tracing::debug!("Workout session already active");
            return false;
        }
        *state = SessionState::Active {
            started_at: now,
            activity,
        };
        tracing::info!("Workout session started for {} at {}", activity, now);
        true
    }

    /// End the running session now. The state is already `Idle` while
    /// `persist` runs, so a `start` during the save begins a new session.
    pub async fn end<F, Fut>(
        &self,
        data_origin: &str,
        persist: F,
    ) -> Result<Option<Workout>, Cancelled>
    where
        F: FnOnce(Workout) -> Fut,
        Fut: Future<Output = Result<bool, Cancelled>>,
    {
        self.end_at(data_origin, Utc::now(), persist).await
    }

    /// End the running session and hand the workout to `persist`.
    ///
    /// The state is reset to `Idle` before `persist` runs, so a concurrent
    /// `end` cannot save the same session twice. Returns the workout only if
    /// `persist` reports success.
    pub async fn end_at<F, Fut>(
        &self,
        data_origin: &str,
        now: DateTime<Utc>,
        persist: F,
    ) -> Result<Option<Workout>, Cancelled>
    where
        F: FnOnce(Workout) -> Fut,
        Fut: Future<Output = Result<bool, Cancelled>>,
    {
        if !self.live {
            return Ok(None);
        }

        let (started_at, activity) = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, SessionState::Idle) {
                SessionState::Idle => {
                    tracing::debug!("No active workout session to end");
                    return Ok(None);
                }
                SessionState::Active {
                    started_at,
                    activity,
                } => (started_at, activity),
            }
        };

        // A clock step backwards must not produce an inverted workout
        let ended_at = now.max(started_at);
        tracing::info!(
            "Ending workout session - Duration: {:.1} minutes",
            (ended_at - started_at).num_seconds() as f64 / 60.0
        );

        let workout =
            Workout::new(data_origin, activity, started_at, ended_at).with_title(activity.name());

        if persist(workout.clone()).await? {
            tracing::info!("Workout session ended and saved successfully");
            Ok(Some(workout))
        } else {
            tracing::warn!("Failed to save workout");
            Ok(None)
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock(), SessionState::Active { .. })
    }

    pub fn snapshot(&self) -> SessionState {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_double_start_rejected_without_mutation() {
        let machine = WorkoutSessionMachine::new();
        assert!(machine.start_at(ActivityType::Running, t0()));
        assert!(!machine.start_at(ActivityType::Cycling, t0() + Duration::minutes(1)));
        assert_eq!(
            machine.snapshot(),
            SessionState::Active {
                started_at: t0(),
                activity: ActivityType::Running
            }
        );
    }

    #[tokio::test]
    async fn test_end_while_idle_is_none() {
        let machine = WorkoutSessionMachine::new();
        let calls = AtomicUsize::new(0);
        let ended = machine
            .end("app", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            })
            .await
            .unwrap();
        assert!(ended.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_end_builds_workout() {
        let machine = WorkoutSessionMachine::new();
        machine.start_at(ActivityType::TraditionalStrengthTraining, t0());
        let end = t0() + Duration::minutes(45);
        let workout = machine
            .end_at("vitals", end, |_| async { Ok(true) })
            .await
            .unwrap()
            .unwrap();
        assert!(workout.meta.id.is_empty());
        assert_eq!(workout.meta.data_origin, "vitals");
        assert_eq!(workout.meta.timestamp, t0());
        assert_eq!(workout.title.as_deref(), Some("TraditionalStrengthTraining"));
        assert_eq!(workout.duration(), Duration::minutes(45));
        assert!(!machine.is_active());
    }

    #[tokio::test]
    async fn test_failed_write_still_returns_to_idle() {
        let machine = WorkoutSessionMachine::new();
        machine.start(ActivityType::Yoga);
        let ended = machine.end("app", |_| async { Ok(false) }).await.unwrap();
        assert!(ended.is_none());
        assert_eq!(machine.snapshot(), SessionState::Idle);
        assert!(machine.start(ActivityType::Yoga));
    }

    #[tokio::test]
    async fn test_cancelled_write_still_returns_to_idle() {
        let machine = WorkoutSessionMachine::new();
        machine.start(ActivityType::Walking);
        let ended = machine.end("app", |_| async { Err(Cancelled) }).await;
        assert_eq!(ended, Err(Cancelled));
        assert!(!machine.is_active());
    }

    #[tokio::test]
    async fn test_inactive_during_persist() {
        let machine = Arc::new(WorkoutSessionMachine::new());
        machine.start(ActivityType::Rowing);
        let observer = machine.clone();
        let ended = machine
            .end("app", move |_| async move { Ok(!observer.is_active()) })
            .await
            .unwrap();
        assert!(ended.is_some());
    }

    #[tokio::test]
    async fn test_start_accepted_while_previous_session_saves() {
        let machine = Arc::new(WorkoutSessionMachine::new());
        machine.start_at(ActivityType::Running, t0());
        let next = machine.clone();
        let ended = machine
            .end_at("app", t0() + Duration::minutes(30), move |_| async move {
                Ok(next.start_at(ActivityType::Cycling, t0() + Duration::minutes(31)))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ended.activity_type, ActivityType::Running);
        assert_eq!(
            machine.snapshot(),
            SessionState::Active {
                started_at: t0() + Duration::minutes(31),
                activity: ActivityType::Cycling
            }
        );
    }

    #[tokio::test]
    async fn test_unavailable_machine_is_noop() {
        let machine = WorkoutSessionMachine::unavailable();
        assert!(!machine.start(ActivityType::Running));
        assert!(!machine.is_active());
        let ended = machine.end("app", |_| async { Ok(true) }).await.unwrap();
        assert!(ended.is_none());
    }

    #[test]
    fn test_concurrent_starts_admit_one() {
        let machine = Arc::new(WorkoutSessionMachine::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = machine.clone();
                std::thread::spawn(move || m.start(ActivityType::Running))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
