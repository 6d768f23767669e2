//! Canonical domain types for the Vitals health bridge.
//!
//! This module defines the platform-neutral shapes every consumer sees:
//! - Metric variants (steps, weight, height, active calories, heart rate, workouts)
//! - The tagged `HealthRecord` union and the `HealthMetric` typed view over it
//! - Permission requests and negotiation outcomes

use crate::activity::ActivityType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical mass unit
pub const UNIT_KG: &str = "kg";
/// Canonical length unit
pub const UNIT_CM: &str = "cm";
/// Canonical energy unit
pub const UNIT_KCAL: &str = "kcal";
/// Canonical heart-rate unit
pub const UNIT_BPM: &str = "BPM";

// ============================================================================
// Metric Kinds
// ============================================================================

/// Variant tag for a health metric
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Steps,
    Weight,
    Height,
    ActiveCaloriesBurned,
    HeartRate,
    Workout,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Steps,
        MetricKind::Weight,
        MetricKind::Height,
        MetricKind::ActiveCaloriesBurned,
        MetricKind::HeartRate,
        MetricKind::Workout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::Weight => "weight",
            MetricKind::Height => "height",
            MetricKind::ActiveCaloriesBurned => "active_calories_burned",
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Workout => "workout",
        }
    }

    /// Permission-level data type guarding this metric
    pub fn data_type(&self) -> HealthDataType {
        match self {
            MetricKind::Steps => HealthDataType::Steps,
            MetricKind::Weight => HealthDataType::Weight,
            MetricKind::Height => HealthDataType::Height,
            MetricKind::ActiveCaloriesBurned => HealthDataType::ActiveCaloriesBurned,
            MetricKind::HeartRate => HealthDataType::HeartRate,
            MetricKind::Workout => HealthDataType::ExerciseSession,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "steps" => Ok(MetricKind::Steps),
            "weight" => Ok(MetricKind::Weight),
            "height" => Ok(MetricKind::Height),
            "active_calories_burned" | "active_calories" | "calories" => {
                Ok(MetricKind::ActiveCaloriesBurned)
            }
            "heart_rate" | "hr" => Ok(MetricKind::HeartRate),
            "workout" | "workouts" | "exercise" => Ok(MetricKind::Workout),
            other => Err(crate::Error::Other(format!("Unknown metric: {}", other))),
        }
    }
}

/// Data type as the permission layer sees it
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthDataType {
    Steps,
    Weight,
    Height,
    ActiveCaloriesBurned,
    HeartRate,
    ExerciseSession,
}

// ============================================================================
// Permissions
// ============================================================================

bitflags::bitflags! {
    /// Access requested for a data type; read and write may be combined
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PermissionType: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

/// A single data-type permission request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HealthPermission {
    pub data_type: HealthDataType,
    pub permission_type: PermissionType,
}

impl HealthPermission {
    pub fn new(data_type: HealthDataType, permission_type: PermissionType) -> Self {
        Self {
            data_type,
            permission_type,
        }
    }

    pub fn read(data_type: HealthDataType) -> Self {
        Self::new(data_type, PermissionType::READ)
    }

    pub fn write(data_type: HealthDataType) -> Self {
        Self::new(data_type, PermissionType::WRITE)
    }
}

/// Why a permission negotiation did not succeed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("health data is not supported on this platform")]
    NotSupported,

    #[error("problem while fetching already granted permissions: {0}")]
    ProblemFetchingGranted(String),

    #[error("missing permissions: {0:?}")]
    MissingPermissions(Vec<String>),

    #[error("problem while granting permissions: {0}")]
    GrantError(String),
}

/// Outcome of a permission negotiation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionResult {
    pub error: Option<PermissionError>,
}

impl PermissionResult {
    pub fn success() -> Self {
        Self { error: None }
    }

    pub fn failure(error: PermissionError) -> Self {
        Self { error: Some(error) }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Identifiers still denied after the prompt (empty unless `MissingPermissions`)
    pub fn denied_permissions(&self) -> &[String] {
        match &self.error {
            Some(PermissionError::MissingPermissions(denied)) => denied,
            _ => &[],
        }
    }
}

// ============================================================================
// Metric Records
// ============================================================================

/// Fields every record carries
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordMeta {
    /// Origin-assigned id, empty until first persisted
    pub id: String,
    /// Writing app or device
    pub data_origin: String,
    pub timestamp: DateTime<Utc>,
}

impl RecordMeta {
    /// Metadata for a record that has not been persisted yet
    pub fn new(data_origin: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            data_origin: data_origin.into(),
            timestamp,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Steps {
    pub meta: RecordMeta,
    pub count: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Steps {
    pub fn new(
        data_origin: impl Into<String>,
        count: u64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, start_time),
            count,
            start_time,
            end_time,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Weight {
    pub meta: RecordMeta,
    /// Kilograms
    pub value: f64,
    pub unit: String,
}

impl Weight {
    pub fn new(data_origin: impl Into<String>, kilograms: f64, at: DateTime<Utc>) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, at),
            value: kilograms,
            unit: UNIT_KG.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Height {
    pub meta: RecordMeta,
    /// Centimeters
    pub value: f64,
    pub unit: String,
}

impl Height {
    pub fn new(data_origin: impl Into<String>, centimeters: f64, at: DateTime<Utc>) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, at),
            value: centimeters,
            unit: UNIT_CM.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveCaloriesBurned {
    pub meta: RecordMeta,
    /// Kilocalories
    pub energy: f64,
    pub unit: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ActiveCaloriesBurned {
    pub fn new(
        data_origin: impl Into<String>,
        kilocalories: f64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, start_time),
            energy: kilocalories,
            unit: UNIT_KCAL.into(),
            start_time,
            end_time,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeartRate {
    pub meta: RecordMeta,
    pub beats_per_minute: f64,
    pub unit: String,
}

impl HeartRate {
    pub fn new(data_origin: impl Into<String>, beats_per_minute: f64, at: DateTime<Utc>) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, at),
            beats_per_minute,
            unit: UNIT_BPM.into(),
        }
    }
}

/// A completed workout.
///
/// The heart-rate fields are never stored by a platform; the query engine
/// derives them from heart-rate samples inside the workout window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub meta: RecordMeta,
    pub activity_type: ActivityType,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Kilocalories
    pub energy_burned: Option<f64>,
    /// Meters
    pub distance: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub min_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
}

impl Workout {
    pub fn new(
        data_origin: impl Into<String>,
        activity_type: ActivityType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: RecordMeta::new(data_origin, start_time),
            activity_type,
            title: None,
            start_time,
            end_time,
            energy_burned: None,
            distance: None,
            average_heart_rate: None,
            min_heart_rate: None,
            max_heart_rate: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Any canonical health record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthRecord {
    Steps(Steps),
    Weight(Weight),
    Height(Height),
    ActiveCaloriesBurned(ActiveCaloriesBurned),
    HeartRate(HeartRate),
    Workout(Workout),
}

impl HealthRecord {
    pub fn kind(&self) -> MetricKind {
        match self {
            HealthRecord::Steps(_) => MetricKind::Steps,
            HealthRecord::Weight(_) => MetricKind::Weight,
            HealthRecord::Height(_) => MetricKind::Height,
            HealthRecord::ActiveCaloriesBurned(_) => MetricKind::ActiveCaloriesBurned,
            HealthRecord::HeartRate(_) => MetricKind::HeartRate,
            HealthRecord::Workout(_) => MetricKind::Workout,
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        match self {
            HealthRecord::Steps(r) => &r.meta,
            HealthRecord::Weight(r) => &r.meta,
            HealthRecord::Height(r) => &r.meta,
            HealthRecord::ActiveCaloriesBurned(r) => &r.meta,
            HealthRecord::HeartRate(r) => &r.meta,
            HealthRecord::Workout(r) => &r.meta,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.meta().timestamp
    }

    /// `(start, end)` for duration-bearing variants
    pub fn interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            HealthRecord::Steps(r) => Some((r.start_time, r.end_time)),
            HealthRecord::ActiveCaloriesBurned(r) => Some((r.start_time, r.end_time)),
            HealthRecord::Workout(r) => Some((r.start_time, r.end_time)),
            _ => None,
        }
    }

    /// Check the interval and timestamp invariants
    pub fn validate(&self) -> crate::Result<()> {
        if let Some((start, end)) = self.interval() {
            if end < start {
                return Err(crate::Error::Encode(format!(
                    "{} ends before it starts ({} < {})",
                    self.kind(),
                    end,
                    start
                )));
            }
            let ts = self.timestamp();
            if ts < start || ts > end {
                return Err(crate::Error::Encode(format!(
                    "{} timestamp {} outside [{}, {}]",
                    self.kind(),
                    ts,
                    start,
                    end
                )));
            }
        }
        Ok(())
    }
}

/// Typed view over one `HealthRecord` variant
pub trait HealthMetric: Sized + Clone + Send + Sync + 'static {
    const KIND: MetricKind;

    fn from_record(record: HealthRecord) -> Option<Self>;

    fn into_record(self) -> HealthRecord;
}

macro_rules! health_metric {
    ($ty:ident, $kind:ident) => {
        impl HealthMetric for $ty {
            const KIND: MetricKind = MetricKind::$kind;

            fn from_record(record: HealthRecord) -> Option<Self> {
                match record {
                    HealthRecord::$kind(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_record(self) -> HealthRecord {
                HealthRecord::$kind(self)
            }
        }

        impl From<$ty> for HealthRecord {
            fn from(value: $ty) -> Self {
                HealthRecord::$kind(value)
            }
        }
    };
}

health_metric!(Steps, Steps);
health_metric!(Weight, Weight);
health_metric!(Height, Height);
health_metric!(ActiveCaloriesBurned, ActiveCaloriesBurned);
health_metric!(HeartRate, HeartRate);
health_metric!(Workout, Workout);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, 0, 0).unwrap()
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!("steps".parse::<MetricKind>().unwrap(), MetricKind::Steps);
        assert_eq!(
            "active-calories".parse::<MetricKind>().unwrap(),
            MetricKind::ActiveCaloriesBurned
        );
        assert_eq!("HR".parse::<MetricKind>().unwrap(), MetricKind::HeartRate);
        assert!("blood_pressure".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_workout_maps_to_exercise_session() {
        assert_eq!(
            MetricKind::Workout.data_type(),
            HealthDataType::ExerciseSession
        );
    }

    #[test]
    fn test_permission_flags_combine() {
        let both = PermissionType::READ | PermissionType::WRITE;
        assert!(both.contains(PermissionType::READ));
        assert!(both.contains(PermissionType::WRITE));
        assert!(!PermissionType::READ.contains(PermissionType::WRITE));
    }

    #[test]
    fn test_denied_permissions_only_for_missing() {
        let missing = PermissionResult::failure(PermissionError::MissingPermissions(vec![
            "a".into(),
        ]));
        assert_eq!(missing.denied_permissions(), &["a".to_string()]);

        let other = PermissionResult::failure(PermissionError::NotSupported);
        assert!(other.denied_permissions().is_empty());
        assert!(PermissionResult::success().is_success());
    }

    #[test]
    fn test_steps_timestamp_is_start() {
        let steps = Steps::new("app", 1500, at(8), at(9));
        assert_eq!(steps.meta.timestamp, at(8));
        assert!(steps.meta.id.is_empty());
        assert!(HealthRecord::from(steps).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_interval() {
        let steps = Steps::new("app", 10, at(9), at(8));
        assert!(HealthRecord::from(steps).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_timestamp_outside_window() {
        let mut calories = ActiveCaloriesBurned::new("app", 120.0, at(8), at(9));
        calories.meta.timestamp = at(10);
        assert!(HealthRecord::from(calories).validate().is_err());
    }

    #[test]
    fn test_typed_view_round_trip() {
        let record = HealthRecord::from(Weight::new("app", 75.5, at(7)));
        assert_eq!(record.kind(), MetricKind::Weight);
        assert!(Steps::from_record(record.clone()).is_none());
        let weight = Weight::from_record(record).unwrap();
        assert_eq!(weight.value, 75.5);
        assert_eq!(weight.unit, "kg");
    }
}
