//! HealthKit-style backend.
//!
//! Quantity samples carry typed quantities that convert between compatible
//! units, workouts carry their own energy and distance totals, and the
//! sample source names the writing app. HealthKit never reveals whether a
//! read grant was given, so read access counts as granted once its prompt
//! has been shown.

use crate::activity;
use crate::codec::MetricCodec;
use crate::error::Error;
use crate::permissions::PermissionGateway;
use crate::platform::HostPlatform;
use crate::query::NativeStore;
use crate::service::HealthBackend;
use crate::types::{
    ActiveCaloriesBurned, HealthDataType, HealthPermission, HealthRecord, HeartRate, Height,
    MetricKind, PermissionType, RecordMeta, Steps, Weight, Workout,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const STEP_COUNT: &str = "HKQuantityTypeIdentifierStepCount";
pub const BODY_MASS: &str = "HKQuantityTypeIdentifierBodyMass";
pub const HEIGHT: &str = "HKQuantityTypeIdentifierHeight";
pub const ACTIVE_ENERGY_BURNED: &str = "HKQuantityTypeIdentifierActiveEnergyBurned";
pub const HEART_RATE: &str = "HKQuantityTypeIdentifierHeartRate";
pub const WORKOUT_TYPE: &str = "HKWorkoutTypeIdentifier";

const READ_PREFIX: &str = "read:";
const SHARE_PREFIX: &str = "share:";

/// Source name reported when a sample has none
const UNKNOWN_SOURCE: &str = "Unknown";

pub fn type_identifier(data_type: HealthDataType) -> &'static str {
    match data_type {
        HealthDataType::Steps => STEP_COUNT,
        HealthDataType::Weight => BODY_MASS,
        HealthDataType::Height => HEIGHT,
        HealthDataType::ActiveCaloriesBurned => ACTIVE_ENERGY_BURNED,
        HealthDataType::HeartRate => HEART_RATE,
        HealthDataType::ExerciseSession => WORKOUT_TYPE,
    }
}

const ALL_TYPES: [&str; 6] = [
    STEP_COUNT,
    BODY_MASS,
    HEIGHT,
    ACTIVE_ENERGY_BURNED,
    HEART_RATE,
    WORKOUT_TYPE,
];

// ============================================================================
// Quantities
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HkUnit {
    Count,
    Gram,
    Kilogram,
    Meter,
    Centimeter,
    Kilocalorie,
    Kilojoule,
    CountPerMinute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dimension {
    Scalar,
    Mass,
    Length,
    Energy,
    Frequency,
}

impl HkUnit {
    /// Dimension and factor to that dimension's base unit
    fn base(self) -> (Dimension, f64) {
        match self {
            HkUnit::Count => (Dimension::Scalar, 1.0),
            HkUnit::Gram => (Dimension::Mass, 1.0),
            HkUnit::Kilogram => (Dimension::Mass, 1000.0),
            HkUnit::Meter => (Dimension::Length, 1.0),
            HkUnit::Centimeter => (Dimension::Length, 0.01),
            HkUnit::Kilocalorie => (Dimension::Energy, 1.0),
            HkUnit::Kilojoule => (Dimension::Energy, 1.0 / 4.184),
            HkUnit::CountPerMinute => (Dimension::Frequency, 1.0),
        }
    }
}

/// A value with its unit
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HkQuantity {
    pub value: f64,
    pub unit: HkUnit,
}

impl HkQuantity {
    pub fn new(unit: HkUnit, value: f64) -> Self {
        Self { value, unit }
    }

    /// Value in `unit`, or `None` if the units are incompatible
    pub fn double_value(&self, unit: HkUnit) -> Option<f64> {
        let (from_dim, from_factor) = self.unit.base();
        let (to_dim, to_factor) = unit.base();
        if from_dim != to_dim {
            return None;
        }
        Some(self.value * from_factor / to_factor)
    }
}

// ============================================================================
// Samples
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HkQuantitySample {
    #[serde(default)]
    pub uuid: String,
    pub quantity_type: String,
    pub quantity: HkQuantity,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub source_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HkWorkout {
    #[serde(default)]
    pub uuid: String,
    pub activity_type: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    pub total_energy_burned: Option<HkQuantity>,
    pub total_distance: Option<HkQuantity>,
    #[serde(default)]
    pub source_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sample")]
pub enum HkSample {
    Quantity(HkQuantitySample),
    Workout(HkWorkout),
}

impl HkSample {
    pub fn uuid(&self) -> &str {
        match self {
            HkSample::Quantity(s) => &s.uuid,
            HkSample::Workout(w) => &w.uuid,
        }
    }

    pub fn set_uuid(&mut self, uuid: String) {
        match self {
            HkSample::Quantity(s) => s.uuid = uuid,
            HkSample::Workout(w) => w.uuid = uuid,
        }
    }

    /// Sample or workout type identifier
    pub fn type_identifier(&self) -> &str {
        match self {
            HkSample::Quantity(s) => &s.quantity_type,
            HkSample::Workout(_) => WORKOUT_TYPE,
        }
    }

    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            HkSample::Quantity(s) => (s.start_date, s.end_date),
            HkSample::Workout(w) => (w.start_date, w.end_date),
        }
    }
}

// ============================================================================
// Store surface
// ============================================================================

/// Sharing authorization for one type; read authorization is never reported
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    SharingDenied,
    SharingAuthorized,
}

/// What the HealthKit store offers beyond sample query and save
#[async_trait]
pub trait HealthStore: NativeStore<HkSample> + 'static {
    fn is_health_data_available(&self) -> bool;

    fn authorization_status(&self, type_identifier: &str) -> AuthorizationStatus;

    /// Whether a read prompt has ever been shown for the type
    fn read_authorization_requested(&self, type_identifier: &str) -> bool;

    async fn request_authorization(&self, share: &[String], read: &[String]) -> Result<()>;
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct HealthKitCodec;

fn source(meta: &RecordMeta) -> Option<String> {
    if meta.data_origin.is_empty() {
        None
    } else {
        Some(meta.data_origin.clone())
    }
}

fn meta(uuid: &str, source_name: &Option<String>, timestamp: DateTime<Utc>) -> RecordMeta {
    RecordMeta {
        id: uuid.to_string(),
        data_origin: source_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        timestamp,
    }
}

fn quantity_sample(
    meta: &RecordMeta,
    quantity_type: &str,
    quantity: HkQuantity,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> HkSample {
    HkSample::Quantity(HkQuantitySample {
        uuid: meta.id.clone(),
        quantity_type: quantity_type.to_string(),
        quantity,
        start_date,
        end_date,
        source_name: source(meta),
    })
}

impl HealthKitCodec {
    fn decode_quantity(&self, sample: &HkQuantitySample, kind: MetricKind) -> Option<HealthRecord> {
        let expected = type_identifier(kind.data_type());
        if sample.quantity_type != expected {
            return None;
        }

        let unit = match kind {
            MetricKind::Steps => HkUnit::Count,
            MetricKind::Weight => HkUnit::Gram,
            MetricKind::Height => HkUnit::Meter,
            MetricKind::ActiveCaloriesBurned => HkUnit::Kilocalorie,
            MetricKind::HeartRate => HkUnit::CountPerMinute,
            MetricKind::Workout => return None,
        };
        let value = match sample.quantity.double_value(unit) {
            Some(value) => value,
            None => {
                tracing::warn!(
                    "Skipping {} sample {} with incompatible unit {:?}",
                    kind,
                    sample.uuid,
                    sample.quantity.unit
                );
                return None;
            }
        };

        let start = sample.start_date;
        let end = sample.end_date;
        let meta = meta(&sample.uuid, &sample.source_name, start);
        let record = match kind {
            MetricKind::Steps => HealthRecord::Steps(Steps {
                meta,
                count: value.max(0.0) as u64,
                start_time: start,
                end_time: end,
            }),
            MetricKind::Weight => {
                let mut weight = Weight::new("", value / 1000.0, start);
                weight.meta = meta;
                HealthRecord::Weight(weight)
            }
            MetricKind::Height => {
                let mut height = Height::new("", value * 100.0, start);
                height.meta = meta;
                HealthRecord::Height(height)
            }
            MetricKind::ActiveCaloriesBurned => {
                let mut calories = ActiveCaloriesBurned::new("", value, start, end);
                calories.meta = meta;
                HealthRecord::ActiveCaloriesBurned(calories)
            }
            MetricKind::HeartRate => {
                let mut hr = HeartRate::new("", value, start);
                hr.meta = meta;
                HealthRecord::HeartRate(hr)
            }
            MetricKind::Workout => return None,
        };
        Some(record)
    }

    fn decode_workout(&self, workout: &HkWorkout) -> HealthRecord {
        let mut decoded = Workout::new(
            "",
            activity::from_healthkit(workout.activity_type),
            workout.start_date,
            workout.end_date,
        );
        decoded.meta = meta(&workout.uuid, &workout.source_name, workout.start_date);
        decoded.energy_burned = workout
            .total_energy_burned
            .and_then(|q| q.double_value(HkUnit::Kilocalorie));
        decoded.distance = workout
            .total_distance
            .and_then(|q| q.double_value(HkUnit::Meter));
        HealthRecord::Workout(decoded)
    }
}

impl MetricCodec for HealthKitCodec {
    type Native = HkSample;

    fn encode(&self, record: &HealthRecord) -> Result<HkSample> {
        record.validate()?;

        let sample = match record {
            HealthRecord::Steps(s) => quantity_sample(
                &s.meta,
                STEP_COUNT,
                HkQuantity::new(HkUnit::Count, s.count as f64),
                s.start_time,
                s.end_time,
            ),
            HealthRecord::Weight(w) => quantity_sample(
                &w.meta,
                BODY_MASS,
                HkQuantity::new(HkUnit::Gram, w.value * 1000.0),
                w.meta.timestamp,
                w.meta.timestamp,
            ),
            HealthRecord::Height(h) => quantity_sample(
                &h.meta,
                HEIGHT,
                HkQuantity::new(HkUnit::Meter, h.value / 100.0),
                h.meta.timestamp,
                h.meta.timestamp,
            ),
            HealthRecord::ActiveCaloriesBurned(c) => quantity_sample(
                &c.meta,
                ACTIVE_ENERGY_BURNED,
                HkQuantity::new(HkUnit::Kilocalorie, c.energy),
                c.start_time,
                c.end_time,
            ),
            HealthRecord::HeartRate(hr) => quantity_sample(
                &hr.meta,
                HEART_RATE,
                HkQuantity::new(HkUnit::CountPerMinute, hr.beats_per_minute),
                hr.meta.timestamp,
                hr.meta.timestamp,
            ),
            HealthRecord::Workout(w) => {
                if w.energy_burned.is_some_and(|e| e < 0.0) || w.distance.is_some_and(|d| d < 0.0)
                {
                    return Err(Error::Encode(
                        "workout totals must not be negative".to_string(),
                    ));
                }
                HkSample::Workout(HkWorkout {
                    uuid: w.meta.id.clone(),
                    activity_type: activity::to_healthkit(w.activity_type),
                    start_date: w.start_time,
                    end_date: w.end_time,
                    duration: w.duration().num_milliseconds() as f64 / 1000.0,
                    total_energy_burned: w
                        .energy_burned
                        .map(|kcal| HkQuantity::new(HkUnit::Kilocalorie, kcal)),
                    total_distance: w.distance.map(|m| HkQuantity::new(HkUnit::Meter, m)),
                    source_name: source(&w.meta),
                })
            }
        };
        Ok(sample)
    }

    fn decode(&self, native: &HkSample, kind: MetricKind) -> Option<HealthRecord> {
        match (kind, native) {
            (MetricKind::Workout, HkSample::Workout(w)) => Some(self.decode_workout(w)),
            (MetricKind::Workout, HkSample::Quantity(_)) => None,
            (_, HkSample::Quantity(s)) => self.decode_quantity(s, kind),
            (_, HkSample::Workout(_)) => None,
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// HealthKit backend over any store implementation
pub struct HealthKit<S: HealthStore> {
    store: Arc<S>,
    codec: HealthKitCodec,
    live_sessions: bool,
}

impl<S: HealthStore> HealthKit<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            codec: HealthKitCodec,
            live_sessions: true,
        }
    }

    /// Disable live sessions, as on hosts without the session API
    pub fn with_live_sessions(mut self, enabled: bool) -> Self {
        self.live_sessions = enabled;
        self
    }

    pub fn health_store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: HealthStore> PermissionGateway for HealthKit<S> {
    fn is_available(&self) -> bool {
        self.store.is_health_data_available()
    }

    fn identifiers(&self, permission: &HealthPermission) -> Vec<String> {
        let type_id = type_identifier(permission.data_type);
        let mut ids = Vec::with_capacity(2);
        if permission.permission_type.contains(PermissionType::READ) {
            ids.push(format!("{}{}", READ_PREFIX, type_id));
        }
        if permission.permission_type.contains(PermissionType::WRITE) {
            ids.push(format!("{}{}", SHARE_PREFIX, type_id));
        }
        ids
    }

    fn read_status_observable(&self) -> bool {
        false
    }

    async fn granted(&self) -> Result<HashSet<String>> {
        let mut granted = HashSet::new();
        for type_id in ALL_TYPES {
            if self.store.authorization_status(type_id) == AuthorizationStatus::SharingAuthorized {
                granted.insert(format!("{}{}", SHARE_PREFIX, type_id));
            }
            if self.store.read_authorization_requested(type_id) {
                granted.insert(format!("{}{}", READ_PREFIX, type_id));
            }
        }
        Ok(granted)
    }

    async fn prompt(&self, missing: &[String]) -> Result<HashSet<String>> {
        let mut share = Vec::new();
        let mut read = Vec::new();
        for id in missing {
            if let Some(type_id) = id.strip_prefix(SHARE_PREFIX) {
                share.push(type_id.to_string());
            } else if let Some(type_id) = id.strip_prefix(READ_PREFIX) {
                read.push(type_id.to_string());
            } else {
                return Err(Error::PlatformGrant(format!(
                    "unrecognized permission identifier {}",
                    id
                )));
            }
        }

        self.store.request_authorization(&share, &read).await?;

        let mut granted = self.granted().await?;
        // The answer to a read request is hidden; a shown prompt is all we get
        for type_id in read {
            granted.insert(format!("{}{}", READ_PREFIX, type_id));
        }
        Ok(granted)
    }
}

impl<S: HealthStore> HealthBackend for HealthKit<S> {
    type Gateway = Self;
    type Codec = HealthKitCodec;
    type Store = S;

    fn platform(&self) -> HostPlatform {
        HostPlatform::Ios
    }

    fn gateway(&self) -> &Self {
        self
    }

    fn codec(&self) -> &HealthKitCodec {
        &self.codec
    }

    fn store(&self) -> &S {
        &self.store
    }

    fn live_sessions(&self) -> bool {
        self.live_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, m, 0).unwrap()
    }

    fn round_trip(record: HealthRecord) -> HealthRecord {
        let codec = HealthKitCodec;
        let native = codec.encode(&record).unwrap();
        codec.decode(&native, record.kind()).unwrap()
    }

    #[test]
    fn test_quantity_conversion() {
        let grams = HkQuantity::new(HkUnit::Gram, 75_500.0);
        assert_eq!(grams.double_value(HkUnit::Kilogram), Some(75.5));
        assert!(grams.double_value(HkUnit::Meter).is_none());

        let kj = HkQuantity::new(HkUnit::Kilojoule, 4.184);
        assert!((kj.double_value(HkUnit::Kilocalorie).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weight_stored_in_grams() {
        let record = HealthRecord::from(Weight::new("app", 75.5, at(7, 0)));
        match HealthKitCodec.encode(&record).unwrap() {
            HkSample::Quantity(s) => {
                assert_eq!(s.quantity_type, BODY_MASS);
                assert_eq!(s.quantity, HkQuantity::new(HkUnit::Gram, 75_500.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_preserves_records() {
        let mut workout = Workout::new("app", ActivityType::Cycling, at(14, 0), at(15, 30));
        workout.energy_burned = Some(410.0);
        workout.distance = Some(21_000.0);

        let records = vec![
            HealthRecord::from(Steps::new("app", 2300, at(10, 0), at(12, 0))),
            HealthRecord::from(Weight::new("app", 75.5, at(7, 0))),
            HealthRecord::from(ActiveCaloriesBurned::new("app", 150.0, at(16, 0), at(17, 0))),
            HealthRecord::from(HeartRate::new("app", 142.0, at(14, 35))),
            HealthRecord::from(workout),
        ];
        for record in records {
            assert_eq!(round_trip(record.clone()), record);
        }
    }

    #[test]
    fn test_height_round_trip() {
        match round_trip(Height::new("app", 175.0, at(7, 0)).into()) {
            HealthRecord::Height(h) => assert!((h.value - 175.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_source_is_unknown() {
        let native = HkSample::Quantity(HkQuantitySample {
            uuid: "u1".into(),
            quantity_type: STEP_COUNT.into(),
            quantity: HkQuantity::new(HkUnit::Count, 500.0),
            start_date: at(8, 0),
            end_date: at(9, 0),
            source_name: None,
        });
        let decoded = HealthKitCodec.decode(&native, MetricKind::Steps).unwrap();
        assert_eq!(decoded.meta().data_origin, "Unknown");
        assert_eq!(decoded.meta().id, "u1");
    }

    #[test]
    fn test_wrong_type_decodes_to_none() {
        let native = HealthKitCodec
            .encode(&HeartRate::new("app", 60.0, at(9, 0)).into())
            .unwrap();
        assert!(HealthKitCodec.decode(&native, MetricKind::Steps).is_none());
        assert!(HealthKitCodec.decode(&native, MetricKind::Workout).is_none());
    }

    #[test]
    fn test_incompatible_unit_skipped() {
        let native = HkSample::Quantity(HkQuantitySample {
            uuid: String::new(),
            quantity_type: BODY_MASS.into(),
            quantity: HkQuantity::new(HkUnit::Meter, 1.0),
            start_date: at(7, 0),
            end_date: at(7, 0),
            source_name: None,
        });
        assert!(HealthKitCodec.decode(&native, MetricKind::Weight).is_none());
    }

    #[test]
    fn test_unmapped_activity_codes() {
        let mut native = match HealthKitCodec
            .encode(&Workout::new("app", ActivityType::IceSkating, at(14, 0), at(15, 0)).into())
            .unwrap()
        {
            HkSample::Workout(w) => w,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(native.activity_type, activity::HK_ACTIVITY_OTHER);

        native.activity_type = 4242;
        match HealthKitCodec
            .decode(&HkSample::Workout(native), MetricKind::Workout)
            .unwrap()
        {
            HealthRecord::Workout(w) => assert_eq!(w.activity_type, ActivityType::Unknown),
            other => panic!("unexpected {:?}", other),
        }
    }
}
