//! Persistence collaborator contract.

use crate::outcome::{DayBucket, DecodeOutcome};
use crate::record::GpsRecord;

/// Append-only storage for decoded output, ordered per device.
pub trait PersistenceSink {
    fn append_records(
        &mut self,
        device: &str,
        day: DayBucket,
        records: &[GpsRecord],
    ) -> anyhow::Result<()>;

    fn append_error(&mut self, device: &str, record: &GpsRecord, reason: &str)
    -> anyhow::Result<()>;

    fn append_events(&mut self, device: &str, lines: &[String]) -> anyhow::Result<()>;
}

/// Send everything persistable in `outcome` to `sink`.
///
/// Validated records go out grouped by day, then invalid records, then event
/// lines. Handshakes and framing errors persist nothing.
pub fn route_outcome<S: PersistenceSink + ?Sized>(
    sink: &mut S,
    device: &str,
    outcome: &DecodeOutcome,
) -> anyhow::Result<()> {
    match outcome {
        DecodeOutcome::Records(batch) => {
            for (day, records) in batch.by_day() {
                sink.append_records(device, day, &records)?;
            }
            for invalid in &batch.invalid {
                sink.append_error(device, &invalid.record, &invalid.reason.to_string())?;
            }
        }
        DecodeOutcome::Events { lines } if !lines.is_empty() => {
            sink.append_events(device, lines)?;
        }
        DecodeOutcome::Events { .. }
        | DecodeOutcome::Handshake { .. }
        | DecodeOutcome::FramingError { .. } => {}
    }
    Ok(())
}
