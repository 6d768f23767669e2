//! Workout activity kinds and their platform code tables.
//!
//! Each platform has one closed table used in both directions. Native codes
//! missing from a table decode to `Unknown`; canonical kinds missing from a
//! table encode to the platform's `Other` code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical workout activity kind
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Running,
    Cycling,
    Walking,
    Swimming,
    Hiking,
    Yoga,
    FunctionalStrengthTraining,
    TraditionalStrengthTraining,
    Elliptical,
    Rowing,
    Pilates,
    Dancing,
    Soccer,
    Basketball,
    Baseball,
    Tennis,
    Golf,
    Badminton,
    TableTennis,
    Volleyball,
    Cricket,
    Rugby,
    AmericanFootball,
    Skiing,
    Snowboarding,
    IceSkating,
    Surfing,
    Paddling,
    Sailing,
    MartialArts,
    Boxing,
    Wrestling,
    Climbing,
    CrossTraining,
    StairClimbing,
    JumpRope,
    Other,
    Unknown,
}

impl ActivityType {
    pub const ALL: [ActivityType; 38] = [
        ActivityType::Running,
        ActivityType::Cycling,
        ActivityType::Walking,
        ActivityType::Swimming,
        ActivityType::Hiking,
        ActivityType::Yoga,
        ActivityType::FunctionalStrengthTraining,
        ActivityType::TraditionalStrengthTraining,
        ActivityType::Elliptical,
        ActivityType::Rowing,
        ActivityType::Pilates,
        ActivityType::Dancing,
        ActivityType::Soccer,
        ActivityType::Basketball,
        ActivityType::Baseball,
        ActivityType::Tennis,
        ActivityType::Golf,
        ActivityType::Badminton,
        ActivityType::TableTennis,
        ActivityType::Volleyball,
        ActivityType::Cricket,
        ActivityType::Rugby,
        ActivityType::AmericanFootball,
        ActivityType::Skiing,
        ActivityType::Snowboarding,
        ActivityType::IceSkating,
        ActivityType::Surfing,
        ActivityType::Paddling,
        ActivityType::Sailing,
        ActivityType::MartialArts,
        ActivityType::Boxing,
        ActivityType::Wrestling,
        ActivityType::Climbing,
        ActivityType::CrossTraining,
        ActivityType::StairClimbing,
        ActivityType::JumpRope,
        ActivityType::Other,
        ActivityType::Unknown,
    ];

    /// Display name, also used as the title of session-recorded workouts
    pub fn name(&self) -> &'static str {
        match self {
            ActivityType::Running => "Running",
            ActivityType::Cycling => "Cycling",
            ActivityType::Walking => "Walking",
            ActivityType::Swimming => "Swimming",
            ActivityType::Hiking => "Hiking",
            ActivityType::Yoga => "Yoga",
            ActivityType::FunctionalStrengthTraining => "FunctionalStrengthTraining",
            ActivityType::TraditionalStrengthTraining => "TraditionalStrengthTraining",
            ActivityType::Elliptical => "Elliptical",
            ActivityType::Rowing => "Rowing",
            ActivityType::Pilates => "Pilates",
            ActivityType::Dancing => "Dancing",
            ActivityType::Soccer => "Soccer",
            ActivityType::Basketball => "Basketball",
            ActivityType::Baseball => "Baseball",
            ActivityType::Tennis => "Tennis",
            ActivityType::Golf => "Golf",
            ActivityType::Badminton => "Badminton",
            ActivityType::TableTennis => "TableTennis",
            ActivityType::Volleyball => "Volleyball",
            ActivityType::Cricket => "Cricket",
            ActivityType::Rugby => "Rugby",
            ActivityType::AmericanFootball => "AmericanFootball",
            ActivityType::Skiing => "Skiing",
            ActivityType::Snowboarding => "Snowboarding",
            ActivityType::IceSkating => "IceSkating",
            ActivityType::Surfing => "Surfing",
            ActivityType::Paddling => "Paddling",
            ActivityType::Sailing => "Sailing",
            ActivityType::MartialArts => "MartialArts",
            ActivityType::Boxing => "Boxing",
            ActivityType::Wrestling => "Wrestling",
            ActivityType::Climbing => "Climbing",
            ActivityType::CrossTraining => "CrossTraining",
            ActivityType::StairClimbing => "StairClimbing",
            ActivityType::JumpRope => "JumpRope",
            ActivityType::Other => "Other",
            ActivityType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivityType {
    type Err = crate::Error;

    /// Accepts `TraditionalStrengthTraining`, `traditional_strength_training`
    /// or `traditional-strength-training`
    fn from_str(s: &str) -> crate::Result<Self> {
        let wanted: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        ActivityType::ALL
            .iter()
            .copied()
            .find(|a| a.name().to_lowercase() == wanted)
            .ok_or_else(|| crate::Error::Other(format!("Unknown activity type: {}", s)))
    }
}

// ============================================================================
// Health Connect exercise types
// ============================================================================

/// `EXERCISE_TYPE_OTHER_WORKOUT`
pub const HC_EXERCISE_OTHER: i32 = 0;

const HEALTH_CONNECT_TABLE: &[(ActivityType, i32)] = &[
    (ActivityType::Running, 7),
    (ActivityType::Cycling, 8),
    (ActivityType::Walking, 79),
    (ActivityType::Swimming, 68),
    (ActivityType::Hiking, 36),
    (ActivityType::Yoga, 81),
    (ActivityType::FunctionalStrengthTraining, 28),
    (ActivityType::TraditionalStrengthTraining, 71),
    (ActivityType::Elliptical, 25),
    (ActivityType::Rowing, 61),
    (ActivityType::Pilates, 54),
    (ActivityType::Dancing, 19),
    (ActivityType::Soccer, 62),
    (ActivityType::Basketball, 9),
    (ActivityType::Baseball, 5),
    (ActivityType::Tennis, 73),
    (ActivityType::Golf, 32),
    (ActivityType::Badminton, 3),
    (ActivityType::TableTennis, 72),
    (ActivityType::Volleyball, 78),
    (ActivityType::Cricket, 18),
    (ActivityType::Rugby, 63),
    (ActivityType::AmericanFootball, 1),
    (ActivityType::Skiing, 64),
    (ActivityType::Snowboarding, 66),
    (ActivityType::IceSkating, 40),
    (ActivityType::Surfing, 67),
    (ActivityType::Paddling, 53),
    (ActivityType::Sailing, 65),
    (ActivityType::MartialArts, 47),
    (ActivityType::Boxing, 11),
    (ActivityType::Wrestling, 82),
    (ActivityType::Climbing, 59),
    (ActivityType::CrossTraining, 20),
    (ActivityType::StairClimbing, 70),
    (ActivityType::JumpRope, 44),
    (ActivityType::Other, HC_EXERCISE_OTHER),
];

pub fn from_health_connect(exercise_type: i32) -> ActivityType {
    HEALTH_CONNECT_TABLE
        .iter()
        .find(|(_, code)| *code == exercise_type)
        .map(|(activity, _)| *activity)
        .unwrap_or(ActivityType::Unknown)
}

pub fn to_health_connect(activity: ActivityType) -> i32 {
    HEALTH_CONNECT_TABLE
        .iter()
        .find(|(a, _)| *a == activity)
        .map(|(_, code)| *code)
        .unwrap_or(HC_EXERCISE_OTHER)
}

// ============================================================================
// HealthKit workout activity types
// ============================================================================

/// `HKWorkoutActivityTypeOther`
pub const HK_ACTIVITY_OTHER: u32 = 3000;

// HealthKit has no ice skating or paddling kinds of its own
const HEALTHKIT_TABLE: &[(ActivityType, u32)] = &[
    (ActivityType::AmericanFootball, 1),
    (ActivityType::Badminton, 4),
    (ActivityType::Baseball, 5),
    (ActivityType::Basketball, 6),
    (ActivityType::Boxing, 8),
    (ActivityType::Climbing, 9),
    (ActivityType::Cricket, 10),
    (ActivityType::CrossTraining, 11),
    (ActivityType::Cycling, 13),
    (ActivityType::Dancing, 14),
    (ActivityType::Elliptical, 16),
    (ActivityType::FunctionalStrengthTraining, 20),
    (ActivityType::Golf, 21),
    (ActivityType::Hiking, 24),
    (ActivityType::MartialArts, 28),
    (ActivityType::Rowing, 35),
    (ActivityType::Rugby, 36),
    (ActivityType::Running, 37),
    (ActivityType::Sailing, 38),
    (ActivityType::Soccer, 41),
    (ActivityType::StairClimbing, 44),
    (ActivityType::Surfing, 45),
    (ActivityType::Swimming, 46),
    (ActivityType::TableTennis, 47),
    (ActivityType::Tennis, 48),
    (ActivityType::TraditionalStrengthTraining, 50),
    (ActivityType::Volleyball, 51),
    (ActivityType::Walking, 52),
    (ActivityType::Wrestling, 56),
    (ActivityType::Yoga, 57),
    (ActivityType::Skiing, 61),
    (ActivityType::JumpRope, 64),
    (ActivityType::Pilates, 66),
    (ActivityType::Snowboarding, 67),
    (ActivityType::Other, HK_ACTIVITY_OTHER),
];

pub fn from_healthkit(activity_type: u32) -> ActivityType {
    HEALTHKIT_TABLE
        .iter()
        .find(|(_, code)| *code == activity_type)
        .map(|(activity, _)| *activity)
        .unwrap_or(ActivityType::Unknown)
}

pub fn to_healthkit(activity: ActivityType) -> u32 {
    HEALTHKIT_TABLE
        .iter()
        .find(|(a, _)| *a == activity)
        .map(|(_, code)| *code)
        .unwrap_or(HK_ACTIVITY_OTHER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_activity_names() {
        assert_eq!(
            "traditional_strength_training".parse::<ActivityType>().unwrap(),
            ActivityType::TraditionalStrengthTraining
        );
        assert_eq!(
            "JumpRope".parse::<ActivityType>().unwrap(),
            ActivityType::JumpRope
        );
        assert_eq!(
            "table-tennis".parse::<ActivityType>().unwrap(),
            ActivityType::TableTennis
        );
        assert!("quidditch".parse::<ActivityType>().is_err());
    }

    #[test]
    fn test_tables_have_unique_codes() {
        let hc: HashSet<_> = HEALTH_CONNECT_TABLE.iter().map(|(_, c)| *c).collect();
        assert_eq!(hc.len(), HEALTH_CONNECT_TABLE.len());

        let hk: HashSet<_> = HEALTHKIT_TABLE.iter().map(|(_, c)| *c).collect();
        assert_eq!(hk.len(), HEALTHKIT_TABLE.len());
    }

    #[test]
    fn test_health_connect_known_codes() {
        assert_eq!(from_health_connect(7), ActivityType::Running);
        assert_eq!(from_health_connect(71), ActivityType::TraditionalStrengthTraining);
        assert_eq!(from_health_connect(0), ActivityType::Other);
        assert_eq!(to_health_connect(ActivityType::CrossTraining), 20);
    }

    #[test]
    fn test_unmapped_native_code_is_unknown() {
        assert_eq!(from_health_connect(999), ActivityType::Unknown);
        assert_eq!(from_healthkit(77), ActivityType::Unknown);
    }

    #[test]
    fn test_unmapped_canonical_encodes_to_other() {
        assert_eq!(to_health_connect(ActivityType::Unknown), HC_EXERCISE_OTHER);
        assert_eq!(to_healthkit(ActivityType::Unknown), HK_ACTIVITY_OTHER);
        assert_eq!(to_healthkit(ActivityType::IceSkating), HK_ACTIVITY_OTHER);
        assert_eq!(to_healthkit(ActivityType::Paddling), HK_ACTIVITY_OTHER);
    }

    #[test]
    fn test_every_mapped_kind_round_trips() {
        for activity in ActivityType::ALL {
            if activity == ActivityType::Unknown {
                continue;
            }
            assert_eq!(from_health_connect(to_health_connect(activity)), activity);

            let hk = to_healthkit(activity);
            if hk != HK_ACTIVITY_OTHER || activity == ActivityType::Other {
                assert_eq!(from_healthkit(hk), activity);
            }
        }
    }
}
