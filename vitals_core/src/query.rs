//! Time-windowed reads and writes against a platform backend.
//!
//! A fetch negotiates read access, reads one newest-first page from the
//! native store, decodes what it can and, for workouts, correlates each
//! workout with the heart-rate samples inside its own window.
//!
//! Reads are best effort: any failure short of cancellation is logged and
//! turned into an empty result.

use crate::codec::MetricCodec;
use crate::error::{until_cancelled, Cancelled};
use crate::permissions::negotiate;
use crate::service::HealthBackend;
use crate::time_range::HealthTimeRange;
use crate::types::{HealthPermission, HealthRecord, MetricKind, Workout};
use crate::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Native page size used when nothing else is configured
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Ranged read against a native store
#[derive(Clone, Debug, PartialEq)]
pub struct ReadRequest {
    pub kind: MetricKind,
    pub window: HealthTimeRange,
    pub ascending: bool,
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl ReadRequest {
    /// First page, newest records first
    pub fn newest_first(kind: MetricKind, window: HealthTimeRange, page_size: usize) -> Self {
        Self {
            kind,
            window,
            ascending: false,
            page_size,
            page_token: None,
        }
    }
}

/// One page of native records
#[derive(Clone, Debug)]
pub struct ReadPage<N> {
    pub records: Vec<N>,
    pub next_page_token: Option<String>,
}

impl<N> ReadPage<N> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            next_page_token: None,
        }
    }
}

/// Ranged read and insert on a platform store
#[async_trait]
pub trait NativeStore<N: Send + 'static>: Send + Sync {
    async fn read(&self, request: ReadRequest) -> Result<ReadPage<N>>;

    /// Insert one record, returning the id the store assigned
    async fn insert(&self, record: N) -> Result<String>;
}

/// Heart-rate statistics over a set of samples
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeartRateSummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl HeartRateSummary {
    /// `None` for an empty sample set
    pub fn from_samples(bpm: &[f64]) -> Option<Self> {
        if bpm.is_empty() {
            return None;
        }
        let sum: f64 = bpm.iter().sum();
        let min = bpm.iter().copied().fold(f64::INFINITY, f64::min);
        let max = bpm.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            average: sum / bpm.len() as f64,
            min,
            max,
            count: bpm.len(),
        })
    }

    /// Summary over decoded heart-rate records; other kinds are ignored
    pub fn from_records(records: &[HealthRecord]) -> Option<Self> {
        let bpm: Vec<f64> = records
            .iter()
            .filter_map(|r| match r {
                HealthRecord::HeartRate(hr) => Some(hr.beats_per_minute),
                _ => None,
            })
            .collect();
        Self::from_samples(&bpm)
    }

    pub fn apply_to(&self, workout: &mut Workout) {
        workout.average_heart_rate = Some(self.average);
        workout.min_heart_rate = Some(self.min);
        workout.max_heart_rate = Some(self.max);
    }
}

/// Read/write pipeline over one backend
pub struct QueryEngine<'a, B: HealthBackend> {
    backend: &'a B,
    page_size: usize,
    full_history: bool,
}

impl<'a, B: HealthBackend> QueryEngine<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            page_size: DEFAULT_PAGE_SIZE,
            full_history: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Ask for the full-history identifier alongside read permissions
    pub fn with_full_history(mut self, full_history: bool) -> Self {
        self.full_history = full_history;
        self
    }

    /// Records of `kind` inside `window`, newest first
    pub async fn fetch(
        &self,
        kind: MetricKind,
        window: &HealthTimeRange,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<HealthRecord>, Cancelled> {
        let permission = HealthPermission::read(kind.data_type());
        let negotiated = negotiate(
            self.backend.gateway(),
            &[permission],
            self.full_history,
            cancel,
        )
        .await?;
        if let Some(error) = negotiated.error {
            tracing::warn!("Read permission for {} not available: {}", kind, error);
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Querying {} from {} to {}",
            kind,
            window.start(),
            window.end()
        );

        let mut records = match self.read_decoded(kind, window, cancel).await? {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Error fetching {} data: {}", kind, e);
                return Ok(Vec::new());
            }
        };

        if kind == MetricKind::Workout {
            for record in records.iter_mut() {
                if let HealthRecord::Workout(workout) = record {
                    self.correlate_heart_rate(workout, cancel).await?;
                }
            }
        }

        tracing::debug!("Found {} {} records", records.len(), kind);
        Ok(records)
    }

    /// Negotiate write access, encode and insert. Any failure is `false`.
    pub async fn write(
        &self,
        record: &HealthRecord,
        cancel: &CancellationToken,
    ) -> std::result::Result<bool, Cancelled> {
        let kind = record.kind();
        let permission = HealthPermission::write(kind.data_type());
        let negotiated = negotiate(self.backend.gateway(), &[permission], false, cancel).await?;
        if let Some(error) = negotiated.error {
            tracing::warn!("Write permission for {} denied: {}", kind, error);
            return Ok(false);
        }

        let native = match self.backend.codec().encode(record) {
            Ok(native) => native,
            Err(e) => {
                tracing::warn!("Failed to encode {} record: {}", kind, e);
                return Ok(false);
            }
        };

        match until_cancelled(cancel, self.backend.store().insert(native)).await? {
            Ok(id) => {
                tracing::debug!("Wrote {} record {}", kind, id);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Failed to write {} record: {}", kind, e);
                Ok(false)
            }
        }
    }

    async fn read_decoded(
        &self,
        kind: MetricKind,
        window: &HealthTimeRange,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<Vec<HealthRecord>>, Cancelled> {
        let request = ReadRequest::newest_first(kind, *window, self.page_size);
        let page = match until_cancelled(cancel, self.backend.store().read(request)).await? {
            Ok(page) => page,
            Err(e) => return Ok(Err(e)),
        };
        if page.next_page_token.is_some() {
            tracing::debug!(
                "{} query hit the page size of {}; later pages are not read",
                kind,
                self.page_size
            );
        }
        Ok(Ok(self.backend.codec().decode_all(&page.records, kind)))
    }

    /// Fill the heart-rate fields from samples in the workout's own window.
    /// A failed sub-query leaves them unset.
    async fn correlate_heart_rate(
        &self,
        workout: &mut Workout,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Cancelled> {
        let window = match HealthTimeRange::new(workout.start_time, workout.end_time) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!("Workout {} has no usable window: {}", workout.meta.id, e);
                return Ok(());
            }
        };

        let samples = match self
            .read_decoded(MetricKind::HeartRate, &window, cancel)
            .await?
        {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!("Error querying heart rate records: {}", e);
                return Ok(());
            }
        };

        match HeartRateSummary::from_records(&samples) {
            Some(summary) => {
                tracing::debug!(
                    "Workout HR - Avg: {:.0}, Min: {:.0}, Max: {:.0}",
                    summary.average,
                    summary.min,
                    summary.max
                );
                summary.apply_to(workout);
            }
            None => tracing::debug!("No heart rate samples during workout"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_over_exercise_samples() {
        let summary =
            HeartRateSummary::from_samples(&[125.0, 138.0, 145.0, 142.0, 135.0, 128.0]).unwrap();
        assert!((summary.average - 135.5).abs() < 1e-9);
        assert_eq!(summary.min, 125.0);
        assert_eq!(summary.max, 145.0);
        assert_eq!(summary.count, 6);
    }

    #[test]
    fn test_empty_samples_have_no_summary() {
        assert!(HeartRateSummary::from_samples(&[]).is_none());
        assert!(HeartRateSummary::from_records(&[]).is_none());
    }

    #[test]
    fn test_request_is_newest_first() {
        use chrono::{TimeZone, Utc};
        let window = HealthTimeRange::new(
            Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let request = ReadRequest::newest_first(MetricKind::Steps, window, DEFAULT_PAGE_SIZE);
        assert!(!request.ascending);
        assert_eq!(request.page_size, 1000);
        assert!(request.page_token.is_none());
    }
}
