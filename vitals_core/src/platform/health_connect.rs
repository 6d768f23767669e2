//! Health-Connect-style backend.
//!
//! Native records mirror the Health Connect record classes: instants with
//! zone offsets, metadata carrying the writing package, unit objects for
//! mass/length/energy and sample lists for heart rate. Unit objects are
//! decoded through the multi-strategy `units` chain because their surface
//! differs across SDK releases.

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
use crate::units::{NativeQuantity, ENERGY, LENGTH, MASS};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Offset, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

const PERMISSION_PREFIX: &str = "android.permission.health.";

/// Opt-in permission for data older than the default retention window
pub const READ_HEALTH_DATA_HISTORY: &str = "android.permission.health.READ_HEALTH_DATA_HISTORY";

// ============================================================================
// Native records
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HcMetadata {
    /// Empty until the client assigns one on insert
    #[serde(default)]
    pub id: String,
    /// Package name of the writing app
    #[serde(default)]
    pub data_origin: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepsRecord {
    pub metadata: HcMetadata,
    pub start_time: DateTime<Utc>,
    pub start_zone_offset: Option<i32>,
    pub end_time: DateTime<Utc>,
    pub end_zone_offset: Option<i32>,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightRecord {
    pub metadata: HcMetadata,
    pub time: DateTime<Utc>,
    pub zone_offset: Option<i32>,
    pub weight: NativeQuantity,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeightRecord {
    pub metadata: HcMetadata,
    pub time: DateTime<Utc>,
    pub zone_offset: Option<i32>,
    pub height: NativeQuantity,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveCaloriesBurnedRecord {
    pub metadata: HcMetadata,
    pub start_time: DateTime<Utc>,
    pub start_zone_offset: Option<i32>,
    pub end_time: DateTime<Utc>,
    pub end_zone_offset: Option<i32>,
    pub energy: NativeQuantity,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeartRateSample {
    pub time: DateTime<Utc>,
    pub beats_per_minute: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeartRateRecord {
    pub metadata: HcMetadata,
    pub start_time: DateTime<Utc>,
    pub start_zone_offset: Option<i32>,
    pub end_time: DateTime<Utc>,
    pub end_zone_offset: Option<i32>,
    pub samples: Vec<HeartRateSample>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSessionRecord {
    pub metadata: HcMetadata,
    pub start_time: DateTime<Utc>,
    pub start_zone_offset: Option<i32>,
    pub end_time: DateTime<Utc>,
    pub end_zone_offset: Option<i32>,
    pub exercise_type: i32,
    pub title: Option<String>,
}

/// Any record the Health-Connect-style store holds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "record")]
pub enum HcRecord {
    Steps(StepsRecord),
    Weight(WeightRecord),
    Height(HeightRecord),
    ActiveCaloriesBurned(ActiveCaloriesBurnedRecord),
    HeartRate(HeartRateRecord),
    ExerciseSession(ExerciseSessionRecord),
}

impl HcRecord {
    pub fn metadata(&self) -> &HcMetadata {
        match self {
            HcRecord::Steps(r) => &r.metadata,
            HcRecord::Weight(r) => &r.metadata,
            HcRecord::Height(r) => &r.metadata,
            HcRecord::ActiveCaloriesBurned(r) => &r.metadata,
            HcRecord::HeartRate(r) => &r.metadata,
            HcRecord::ExerciseSession(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut HcMetadata {
        match self {
            HcRecord::Steps(r) => &mut r.metadata,
            HcRecord::Weight(r) => &mut r.metadata,
            HcRecord::Height(r) => &mut r.metadata,
            HcRecord::ActiveCaloriesBurned(r) => &mut r.metadata,
            HcRecord::HeartRate(r) => &mut r.metadata,
            HcRecord::ExerciseSession(r) => &mut r.metadata,
        }
    }

    /// Record class this native belongs to
    pub fn kind(&self) -> MetricKind {
        match self {
            HcRecord::Steps(_) => MetricKind::Steps,
            HcRecord::Weight(_) => MetricKind::Weight,
            HcRecord::Height(_) => MetricKind::Height,
            HcRecord::ActiveCaloriesBurned(_) => MetricKind::ActiveCaloriesBurned,
            HcRecord::HeartRate(_) => MetricKind::HeartRate,
            HcRecord::ExerciseSession(_) => MetricKind::Workout,
        }
    }

    /// `(start, end)` used for time-range filtering; instants have start == end
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            HcRecord::Steps(r) => (r.start_time, r.end_time),
            HcRecord::Weight(r) => (r.time, r.time),
            HcRecord::Height(r) => (r.time, r.time),
            HcRecord::ActiveCaloriesBurned(r) => (r.start_time, r.end_time),
            HcRecord::HeartRate(r) => (r.start_time, r.end_time),
            HcRecord::ExerciseSession(r) => (r.start_time, r.end_time),
        }
    }
}

// ============================================================================
// Client surface
// ============================================================================

/// SDK availability as reported by the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdkStatus {
    Available,
    Unavailable,
    ProviderUpdateRequired,
}

/// What the Health Connect client offers beyond ranged read and insert
#[async_trait]
pub trait HealthConnectClient: NativeStore<HcRecord> + 'static {
    fn sdk_status(&self) -> SdkStatus;

    async fn granted_permissions(&self) -> Result<HashSet<String>>;

    /// Launch the permission contract for `permissions` and return what is
    /// granted afterwards
    async fn request_permissions(&self, permissions: &[String]) -> Result<HashSet<String>>;
}

fn data_type_suffix(data_type: HealthDataType) -> &'static str {
    match data_type {
        HealthDataType::Steps => "STEPS",
        HealthDataType::Weight => "WEIGHT",
        HealthDataType::Height => "HEIGHT",
        HealthDataType::ActiveCaloriesBurned => "ACTIVE_CALORIES_BURNED",
        HealthDataType::HeartRate => "HEART_RATE",
        HealthDataType::ExerciseSession => "EXERCISE",
    }
}

/// Platform permission strings for one request
pub fn permission_strings(permission: &HealthPermission) -> Vec<String> {
    let suffix = data_type_suffix(permission.data_type);
    let mut ids = Vec::with_capacity(2);
    if permission.permission_type.contains(PermissionType::READ) {
        ids.push(format!("{}READ_{}", PERMISSION_PREFIX, suffix));
    }
    if permission.permission_type.contains(PermissionType::WRITE) {
        ids.push(format!("{}WRITE_{}", PERMISSION_PREFIX, suffix));
    }
    ids
}

// ============================================================================
// Codec
// ============================================================================

/// Canonical <-> Health Connect record conversion
#[derive(Clone, Copy, Debug, Default)]
pub struct HealthConnectCodec;

/// Offset the platform stamps on new records
fn local_offset_seconds(at: DateTime<Utc>) -> Option<i32> {
    Some(
        Local
            .offset_from_utc_datetime(&at.naive_utc())
            .fix()
            .local_minus_utc(),
    )
}

/// Instants are written at whole-second precision
fn instant(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

fn metadata(meta: &RecordMeta) -> HcMetadata {
    HcMetadata {
        id: meta.id.clone(),
        data_origin: meta.data_origin.clone(),
    }
}

fn meta(metadata: &HcMetadata, timestamp: DateTime<Utc>) -> RecordMeta {
    RecordMeta {
        id: metadata.id.clone(),
        data_origin: metadata.data_origin.clone(),
        timestamp,
    }
}

impl MetricCodec for HealthConnectCodec {
    type Native = HcRecord;

    fn encode(&self, record: &HealthRecord) -> Result<HcRecord> {
        record.validate()?;

        let native = match record {
            HealthRecord::Steps(s) => {
                let count = i64::try_from(s.count)
                    .map_err(|_| Error::Encode(format!("step count {} out of range", s.count)))?;
                HcRecord::Steps(StepsRecord {
                    metadata: metadata(&s.meta),
                    start_time: instant(s.start_time),
                    start_zone_offset: local_offset_seconds(s.start_time),
                    end_time: instant(s.end_time),
                    end_zone_offset: local_offset_seconds(s.end_time),
                    count,
                })
            }
            HealthRecord::Weight(w) => HcRecord::Weight(WeightRecord {
                metadata: metadata(&w.meta),
                time: instant(w.meta.timestamp),
                zone_offset: local_offset_seconds(w.meta.timestamp),
                weight: MASS.encode(w.value),
            }),
            HealthRecord::Height(h) => HcRecord::Height(HeightRecord {
                metadata: metadata(&h.meta),
                time: instant(h.meta.timestamp),
                zone_offset: local_offset_seconds(h.meta.timestamp),
                height: LENGTH.encode(h.value),
            }),
            HealthRecord::ActiveCaloriesBurned(c) => {
                HcRecord::ActiveCaloriesBurned(ActiveCaloriesBurnedRecord {
                    metadata: metadata(&c.meta),
                    start_time: instant(c.start_time),
                    start_zone_offset: local_offset_seconds(c.start_time),
                    end_time: instant(c.end_time),
                    end_zone_offset: local_offset_seconds(c.end_time),
                    energy: ENERGY.encode(c.energy),
                })
            }
            HealthRecord::HeartRate(hr) => {
                let at = instant(hr.meta.timestamp);
                // One sample per record; the platform stores whole beats
                HcRecord::HeartRate(HeartRateRecord {
                    metadata: metadata(&hr.meta),
                    start_time: at,
                    start_zone_offset: local_offset_seconds(at),
                    end_time: at,
                    end_zone_offset: local_offset_seconds(at),
                    samples: vec![HeartRateSample {
                        time: at,
                        beats_per_minute: hr.beats_per_minute as i64,
                    }],
                })
            }
            HealthRecord::Workout(w) => HcRecord::ExerciseSession(ExerciseSessionRecord {
                metadata: metadata(&w.meta),
                start_time: instant(w.start_time),
                start_zone_offset: local_offset_seconds(w.start_time),
                end_time: instant(w.end_time),
                end_zone_offset: local_offset_seconds(w.end_time),
                exercise_type: activity::to_health_connect(w.activity_type),
                title: w.title.clone(),
            }),
        };
        Ok(native)
    }

    fn decode(&self, native: &HcRecord, kind: MetricKind) -> Option<HealthRecord> {
        let record = match (kind, native) {
            (MetricKind::Steps, HcRecord::Steps(r)) => HealthRecord::Steps(Steps {
                meta: meta(&r.metadata, r.start_time),
                count: u64::try_from(r.count).unwrap_or(0),
                start_time: r.start_time,
                end_time: r.end_time,
            }),
            (MetricKind::Weight, HcRecord::Weight(r)) => {
                let mut weight = Weight::new("", MASS.decode(&r.weight), r.time);
                weight.meta = meta(&r.metadata, r.time);
                HealthRecord::Weight(weight)
            }
            (MetricKind::Height, HcRecord::Height(r)) => {
                let mut height = Height::new("", LENGTH.decode(&r.height), r.time);
                height.meta = meta(&r.metadata, r.time);
                HealthRecord::Height(height)
            }
            (MetricKind::ActiveCaloriesBurned, HcRecord::ActiveCaloriesBurned(r)) => {
                let mut calories =
                    ActiveCaloriesBurned::new("", ENERGY.decode(&r.energy), r.start_time, r.end_time);
                calories.meta = meta(&r.metadata, r.start_time);
                HealthRecord::ActiveCaloriesBurned(calories)
            }
            (MetricKind::HeartRate, HcRecord::HeartRate(r)) => {
                let bpm = r
                    .samples
                    .first()
                    .map(|s| s.beats_per_minute as f64)
                    .unwrap_or(0.0);
                let mut hr = HeartRate::new("", bpm, r.start_time);
                hr.meta = meta(&r.metadata, r.start_time);
                HealthRecord::HeartRate(hr)
            }
            (MetricKind::Workout, HcRecord::ExerciseSession(r)) => {
                let mut workout = Workout::new(
                    "",
                    activity::from_health_connect(r.exercise_type),
                    r.start_time,
                    r.end_time,
                );
                workout.meta = meta(&r.metadata, r.start_time);
                workout.title = r.title.clone();
                HealthRecord::Workout(workout)
            }
            _ => return None,
        };
        Some(record)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Health Connect backend over any client implementation
pub struct HealthConnect<C: HealthConnectClient> {
    client: Arc<C>,
    codec: HealthConnectCodec,
}

impl<C: HealthConnectClient> HealthConnect<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            codec: HealthConnectCodec,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

#[async_trait]
impl<C: HealthConnectClient> PermissionGateway for HealthConnect<C> {
    fn is_available(&self) -> bool {
        match self.client.sdk_status() {
            SdkStatus::Available => true,
            SdkStatus::Unavailable => false,
            SdkStatus::ProviderUpdateRequired => {
                tracing::warn!("Health Connect provider needs an update");
                false
            }
        }
    }

    fn identifiers(&self, permission: &HealthPermission) -> Vec<String> {
        permission_strings(permission)
    }

    fn full_history_identifier(&self) -> Option<String> {
        Some(READ_HEALTH_DATA_HISTORY.to_string())
    }

    async fn granted(&self) -> Result<HashSet<String>> {
        self.client.granted_permissions().await
    }

    async fn prompt(&self, missing: &[String]) -> Result<HashSet<String>> {
        self.client.request_permissions(missing).await
    }
}

impl<C: HealthConnectClient> HealthBackend for HealthConnect<C> {
    type Gateway = Self;
    type Codec = HealthConnectCodec;
    type Store = C;

    fn platform(&self) -> HostPlatform {
        HostPlatform::Android
    }

    fn gateway(&self) -> &Self {
        self
    }

    fn codec(&self) -> &HealthConnectCodec {
        &self.codec
    }

    fn store(&self) -> &C {
        &self.client
    }

    /// Health Connect has no live-session API
    fn live_sessions(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use chrono::Duration;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, h, m, 0).unwrap()
    }

    fn round_trip(record: HealthRecord) -> HealthRecord {
        let codec = HealthConnectCodec;
        let native = codec.encode(&record).unwrap();
        codec.decode(&native, record.kind()).unwrap()
    }

    #[test]
    fn test_permission_strings() {
        let both = HealthPermission::new(
            HealthDataType::ActiveCaloriesBurned,
            PermissionType::READ | PermissionType::WRITE,
        );
        assert_eq!(
            permission_strings(&both),
            vec![
                "android.permission.health.READ_ACTIVE_CALORIES_BURNED",
                "android.permission.health.WRITE_ACTIVE_CALORIES_BURNED",
            ]
        );
        assert_eq!(
            permission_strings(&HealthPermission::read(HealthDataType::ExerciseSession)),
            vec!["android.permission.health.READ_EXERCISE"]
        );
    }

    #[test]
    fn test_round_trip_preserves_records() {
        let records = vec![
            HealthRecord::from(Steps::new("app", 3200, at(14, 0), at(16, 0))),
            HealthRecord::from(Weight::new("app", 75.5, at(7, 0))),
            HealthRecord::from(ActiveCaloriesBurned::new("app", 280.0, at(14, 0), at(15, 0))),
            HealthRecord::from(HeartRate::new("app", 138.0, at(14, 15))),
            HealthRecord::from(
                Workout::new("app", ActivityType::Running, at(14, 0), at(15, 0))
                    .with_title("Running"),
            ),
        ];
        for record in records {
            assert_eq!(round_trip(record.clone()), record);
        }
    }

    #[test]
    fn test_height_round_trips_through_meters() {
        let record = HealthRecord::from(Height::new("app", 180.0, at(7, 0)));
        match round_trip(record) {
            HealthRecord::Height(h) => {
                assert!((h.value - 180.0).abs() < 1e-9);
                assert_eq!(h.unit, "cm");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_heart_rate_encodes_single_truncated_sample() {
        let codec = HealthConnectCodec;
        let record = HealthRecord::from(HeartRate::new("app", 72.9, at(9, 0)));
        match codec.encode(&record).unwrap() {
            HcRecord::HeartRate(r) => {
                assert_eq!(r.samples.len(), 1);
                assert_eq!(r.samples[0].beats_per_minute, 72);
                assert_eq!(r.start_time, r.end_time);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_heart_rate_without_samples_decodes_zero() {
        let native = HcRecord::HeartRate(HeartRateRecord {
            metadata: HcMetadata::default(),
            start_time: at(9, 0),
            start_zone_offset: None,
            end_time: at(9, 0),
            end_zone_offset: None,
            samples: Vec::new(),
        });
        let decoded = HealthConnectCodec
            .decode(&native, MetricKind::HeartRate)
            .unwrap();
        match decoded {
            HealthRecord::HeartRate(hr) => assert_eq!(hr.beats_per_minute, 0.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_legacy_weight_object_decodes_from_text() {
        let native = HcRecord::Weight(WeightRecord {
            metadata: HcMetadata {
                id: "w1".into(),
                data_origin: "com.example.scale".into(),
            },
            time: at(7, 0),
            zone_offset: None,
            weight: NativeQuantity::text_only("75.5 kg"),
        });
        match HealthConnectCodec.decode(&native, MetricKind::Weight).unwrap() {
            HealthRecord::Weight(w) => {
                assert_eq!(w.value, 75.5);
                assert_eq!(w.meta.id, "w1");
                assert_eq!(w.meta.data_origin, "com.example.scale");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_kind_decodes_to_none() {
        let codec = HealthConnectCodec;
        let native = codec
            .encode(&HealthRecord::from(Weight::new("app", 70.0, at(7, 0))))
            .unwrap();
        assert!(codec.decode(&native, MetricKind::Height).is_none());
    }

    #[test]
    fn test_unknown_exercise_type_decodes_unknown() {
        let native = HcRecord::ExerciseSession(ExerciseSessionRecord {
            metadata: HcMetadata::default(),
            start_time: at(14, 0),
            start_zone_offset: None,
            end_time: at(15, 0),
            end_zone_offset: None,
            exercise_type: 9999,
            title: None,
        });
        match HealthConnectCodec.decode(&native, MetricKind::Workout).unwrap() {
            HealthRecord::Workout(w) => assert_eq!(w.activity_type, ActivityType::Unknown),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_activity_encodes_other() {
        let workout = Workout::new("app", ActivityType::Unknown, at(14, 0), at(15, 0));
        match HealthConnectCodec.encode(&workout.into()).unwrap() {
            HcRecord::ExerciseSession(r) => {
                assert_eq!(r.exercise_type, activity::HC_EXERCISE_OTHER)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_rejects_inverted_interval() {
        let steps = Steps::new("app", 10, at(10, 0), at(10, 0) - Duration::minutes(5));
        assert!(matches!(
            HealthConnectCodec.encode(&steps.into()),
            Err(Error::Encode(_))
        ));
    }

    #[test]
    fn test_subsecond_instants_truncated() {
        let ts = at(7, 0) + Duration::milliseconds(750);
        match HealthConnectCodec
            .encode(&Weight::new("app", 70.0, ts).into())
            .unwrap()
        {
            HcRecord::Weight(r) => assert_eq!(r.time, at(7, 0)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
