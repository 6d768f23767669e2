//! Canonical <-> native record conversion.

use crate::types::{HealthRecord, MetricKind};
use crate::Result;

/// Converts canonical records to one platform's native records and back.
///
/// Decoding dispatches on the requested kind, not on what the native value
/// happens to be. A native record of a different shape decodes to `None` and
/// the caller skips it; a malformed numeric field falls back to its unit
/// default instead of failing the record.
pub trait MetricCodec: Send + Sync + 'static {
    type Native: Clone + Send + Sync + 'static;

    /// Build the native record for `record`. Fails only on invariant
    /// violations (see `HealthRecord::validate`).
    fn encode(&self, record: &HealthRecord) -> Result<Self::Native>;

    /// Decode `native` as `kind`, or `None` if it is not that kind.
    fn decode(&self, native: &Self::Native, kind: MetricKind) -> Option<HealthRecord>;

    /// Decode a batch, discarding records that do not match `kind`
    fn decode_all(&self, natives: &[Self::Native], kind: MetricKind) -> Vec<HealthRecord> {
        let decoded: Vec<HealthRecord> = natives
            .iter()
            .filter_map(|native| self.decode(native, kind))
            .collect();
        if decoded.len() < natives.len() {
            tracing::debug!(
                "Skipped {} of {} native records that did not decode as {}",
                natives.len() - decoded.len(),
                natives.len(),
                kind
            );
        }
        decoded
    }
}
