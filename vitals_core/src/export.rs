//! CSV export of canonical records.
//!
//! Rows are appended under an exclusive lock; the header is written only
//! when the file is empty, so repeated exports accumulate in one file.

use crate::types::{HealthRecord, UNIT_BPM};
use crate::Result;
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    kind: &'static str,
    id: String,
    data_origin: String,
    timestamp: String,
    start: Option<String>,
    end: Option<String>,
    value: Option<f64>,
    unit: Option<String>,
    activity: Option<String>,
    title: Option<String>,
    avg_hr: Option<f64>,
    min_hr: Option<f64>,
    max_hr: Option<f64>,
}

impl From<&HealthRecord> for CsvRow {
    fn from(record: &HealthRecord) -> Self {
        let meta = record.meta();
        let (start, end) = match record.interval() {
            Some((s, e)) => (Some(s.to_rfc3339()), Some(e.to_rfc3339())),
            None => (None, None),
        };
        let mut row = CsvRow {
            kind: record.kind().as_str(),
            id: meta.id.clone(),
            data_origin: meta.data_origin.clone(),
            timestamp: meta.timestamp.to_rfc3339(),
            start,
            end,
            value: None,
            unit: None,
            activity: None,
            title: None,
            avg_hr: None,
            min_hr: None,
            max_hr: None,
        };

        match record {
            HealthRecord::Steps(s) => {
                row.value = Some(s.count as f64);
                row.unit = Some("count".into());
            }
            HealthRecord::Weight(w) => {
                row.value = Some(w.value);
                row.unit = Some(w.unit.clone());
            }
            HealthRecord::Height(h) => {
                row.value = Some(h.value);
                row.unit = Some(h.unit.clone());
            }
            HealthRecord::ActiveCaloriesBurned(c) => {
                row.value = Some(c.energy);
                row.unit = Some(c.unit.clone());
            }
            HealthRecord::HeartRate(hr) => {
                row.value = Some(hr.beats_per_minute);
                row.unit = Some(UNIT_BPM.into());
            }
            HealthRecord::Workout(w) => {
                row.value = w.energy_burned;
                row.unit = w.energy_burned.map(|_| crate::types::UNIT_KCAL.to_string());
                row.activity = Some(w.activity_type.name().to_string());
                row.title = w.title.clone();
                row.avg_hr = w.average_heart_rate;
                row.min_hr = w.min_heart_rate;
                row.max_hr = w.max_heart_rate;
            }
        }
        row
    }
}

/// Append `records` to the CSV at `path`, creating it with headers if needed.
///
/// The file is fsynced before returning. Returns the number of rows written.
pub fn write_csv(records: &[HealthRecord], path: &Path) -> Result<usize> {
    if records.is_empty() {
        tracing::info!("No records to export");
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let needs_headers = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(&file);

    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;
    drop(writer);

    file.sync_all()?;
    file.unlock()?;

    tracing::info!("Exported {} records to {:?}", records.len(), path);
    Ok(records.len())
}
