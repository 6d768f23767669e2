//! Pure aggregation over decoded records.

use crate::query::HeartRateSummary;
use crate::time_range::HealthTimeRange;
use crate::types::{ActiveCaloriesBurned, HeartRate, Steps, Weight, Workout};
use serde::Serialize;

/// Saturates instead of overflowing
pub fn total_steps(steps: &[Steps]) -> u64 {
    steps.iter().fold(0u64, |acc, s| acc.saturating_add(s.count))
}

/// Kilocalories
pub fn total_calories(calories: &[ActiveCaloriesBurned]) -> f64 {
    calories.iter().map(|c| c.energy).sum()
}

/// Value of the most recent weight by timestamp
pub fn current_weight(weights: &[Weight]) -> Option<f64> {
    weights
        .iter()
        .max_by_key(|w| w.meta.timestamp)
        .map(|w| w.value)
}

/// Heart-rate samples inside an explicit window
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HeartRateWindow {
    pub count: usize,
    pub average: Option<f64>,
}

pub fn heart_rate_in_window(samples: &[HeartRate], window: &HealthTimeRange) -> HeartRateWindow {
    let bpm: Vec<f64> = samples
        .iter()
        .filter(|hr| window.contains(hr.meta.timestamp))
        .map(|hr| hr.beats_per_minute)
        .collect();
    let summary = HeartRateSummary::from_samples(&bpm);
    HeartRateWindow {
        count: bpm.len(),
        average: summary.map(|s| s.average),
    }
}

/// One day at a glance
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailySummary {
    pub steps: u64,
    pub calories: f64,
    pub weight: Option<f64>,
    pub exercise_heart_rate: HeartRateWindow,
    pub workouts: Vec<Workout>,
}

pub fn daily_summary(
    steps: &[Steps],
    calories: &[ActiveCaloriesBurned],
    weights: &[Weight],
    heart_rate: &[HeartRate],
    exercise_window: &HealthTimeRange,
    workouts: Vec<Workout>,
) -> DailySummary {
    DailySummary {
        steps: total_steps(steps),
        calories: total_calories(calories),
        weight: current_weight(weights),
        exercise_heart_rate: heart_rate_in_window(heart_rate, exercise_window),
        workouts,
    }
}
