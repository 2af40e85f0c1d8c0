//! Summary file (`STR.edf`) parsing
//!
//! The summary file is a multi-day EDF variant: one or more data records per
//! day, dozens of day-level aggregate channels and a pair of mask-on /
//! mask-off channels holding that day's session boundaries. Its headers are
//! frequently malformed, so it is read through [`SummaryDialect`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cpap_sd::summary::SummaryFile;
//!
//! fn print_days() -> cpap_sd::Result<()> {
//!     let summary = SummaryFile::open("STR.edf")?;
//!     for day in summary.records() {
//!         println!(
//!             "{}: {} sessions, AHI {:?}",
//!             day.date,
//!             day.boundaries.len(),
//!             day.statistics.ahi
//!         );
//!     }
//!     Ok(())
//! }
//! ```

use crate::channels::{ChannelId, ChannelSpec};
use crate::checksum::{ChecksumVerifier, CrcMode, CrcStatus};
use crate::edf::dialect::{Dialect, PhysicalRange, UnitResolution, is_plausible_unit};
use crate::edf::format::{Header, RawSignalHeader, parse_number};
use crate::edf::EdfReader;
use crate::types::{
    DayStatistics, ParseWarning, SessionBoundary, SignalDescriptor, SummaryRecord,
};
use crate::{CpapError, Result};
use chrono::{Days, NaiveDate, NaiveDateTime, TimeDelta};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Lenient dialect for the summary file.
///
/// An unusable dimension falls back to the catalog unit; a malformed or
/// inverted physical range falls back to the digital range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryDialect;

impl Dialect for SummaryDialect {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn resolve_unit(&self, raw: &RawSignalHeader, channel: Option<&ChannelSpec>) -> UnitResolution {
        if is_plausible_unit(&raw.dimension) {
            UnitResolution::Declared(raw.dimension.trim().to_string())
        } else {
            UnitResolution::Fallback(channel.map_or("", |spec| spec.native_unit).to_string())
        }
    }

    fn physical_range(&self, raw: &RawSignalHeader, digital: (i32, i32)) -> Result<PhysicalRange> {
        let declared = parse_number::<f64>("physical min", &raw.physical_min)
            .and_then(|min| Ok((min, parse_number::<f64>("physical max", &raw.physical_max)?)));

        match declared {
            Ok((min, max)) if min.is_finite() && max.is_finite() && min <= max => {
                Ok(PhysicalRange::Declared { min, max })
            }
            _ => {
                let (low, high) = (digital.0.min(digital.1), digital.0.max(digital.1));
                Ok(PhysicalRange::DigitalFallback { min: f64::from(low), max: f64::from(high) })
            }
        }
    }
}

/// Parsed summary file.
#[derive(Debug, Clone)]
pub struct SummaryFile {
    path: PathBuf,
    header: Header,
    records: Vec<SummaryRecord>,
    warnings: Vec<ParseWarning>,
    crc_status: CrcStatus,
}

/// Per-day slice bookkeeping while merging records.
struct DayBuilder {
    record: SummaryRecord,
    midnight: NaiveDateTime,
    /// Slot index of the next mask-on/mask-off pair within the day.
    next_slot: usize,
}

impl SummaryFile {
    /// Parse a summary file without checksum verification.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ChecksumVerifier::new(CrcMode::Disabled))
    }

    pub fn open_with<P: AsRef<Path>>(path: P, verifier: &ChecksumVerifier) -> Result<Self> {
        Self::from_reader(EdfReader::open_with(path, SummaryDialect, verifier)?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_reader(EdfReader::from_bytes_with(
            data,
            PathBuf::from("<memory>"),
            SummaryDialect,
        )?)
    }

    /// Build the per-day records from a reader positioned anywhere.
    pub fn from_reader(mut reader: EdfReader<SummaryDialect>) -> Result<Self> {
        let signals = reader.parse_signal_headers()?.to_vec();
        let data = reader.parse_data()?.to_vec();
        let header = reader.parse_header()?.clone();
        let record_count = header.record_count.unwrap_or(0);

        let mut warnings = reader.warnings().to_vec();
        let find = |id: ChannelId| signals.iter().find(|signal| signal.channel_id() == Some(id));
        let mask_on = find(ChannelId::MaskOn);
        let mask_off = find(ChannelId::MaskOff);
        for (id, found) in [(ChannelId::MaskOn, mask_on), (ChannelId::MaskOff, mask_off)] {
            if found.is_none() {
                warn!(path = %reader.file_path().display(), channel = ?id, "Summary channel missing");
                warnings.push(ParseWarning::MissingChannel { channel: id });
            }
        }

        let statistics: Vec<&SignalDescriptor> = signals
            .iter()
            .filter(|signal| signal.is_decodable() && signal.samples_per_record > 0)
            .filter(|signal| {
                signal.channel_id().is_some_and(|id| DayStatistics::CHANNELS.contains(&id))
            })
            .collect();

        let mut days: Vec<DayBuilder> = Vec::new();
        for record in 0..record_count {
            let date = day_of_record(&header, record)?;
            if days.last().is_none_or(|day| day.record.date != date) {
                days.push(DayBuilder {
                    record: SummaryRecord::new(date, record),
                    midnight: date.and_time(chrono::NaiveTime::MIN),
                    next_slot: 0,
                });
            }
            let Some(day) = days.last_mut() else { continue };
            day.record.record_count += 1;

            for signal in &statistics {
                let Some(id) = signal.channel_id() else { continue };
                let samples = record_samples(&data, signal, record);
                if let Some(value) = samples
                    .iter()
                    .find(|&&digital| signal.in_digital_range(digital))
                    .and_then(|&digital| signal.physical(digital))
                {
                    day.record.statistics.fill(id, value * signal.canonical_scale());
                }
            }

            if let (Some(on), Some(off)) = (mask_on, mask_off) {
                let starts = record_samples(&data, on, record);
                let stops = record_samples(&data, off, record);
                for (&start, &stop) in starts.iter().zip(stops) {
                    let slot = day.next_slot;
                    day.next_slot += 1;
                    if !on.in_digital_range(start) || !off.in_digital_range(stop) {
                        continue;
                    }
                    if let Some(warning) = day.add_pair(
                        seconds_of(on, start),
                        seconds_of(off, stop),
                        slot,
                    ) {
                        warn!(%warning, "Dropped summary boundary");
                        warnings.push(warning);
                    }
                }
            }
        }

        let mut records: Vec<SummaryRecord> = days
            .into_iter()
            .map(|mut day| {
                day.record.boundaries.sort();
                day.record
            })
            .collect();
        records.sort_by_key(|record| record.date);

        debug!(
            path = %reader.file_path().display(),
            days = records.len(),
            boundaries = records.iter().map(|r| r.boundaries.len()).sum::<usize>(),
            "Parsed summary file"
        );

        Ok(Self {
            path: reader.file_path().to_path_buf(),
            crc_status: reader.crc_status(),
            header,
            records,
            warnings,
        })
    }

    /// Day records, sorted by date.
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    pub fn record_for(&self, date: NaiveDate) -> Option<&SummaryRecord> {
        self.records
            .binary_search_by_key(&date, |record| record.date)
            .ok()
            .map(|index| &self.records[index])
    }

    /// Every boundary across all days, in time order.
    pub fn boundaries(&self) -> impl Iterator<Item = &SessionBoundary> {
        self.records.iter().flat_map(|record| record.boundaries.iter())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Device serial number from the recording field.
    pub fn serial_number(&self) -> Option<&str> {
        self.header.serial_number()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn crc_status(&self) -> CrcStatus {
        self.crc_status
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DayBuilder {
    /// Record one mask-on/mask-off pair, or the reason it was dropped.
    fn add_pair(&mut self, start: i64, stop: i64, slot: usize) -> Option<ParseWarning> {
        let date = self.record.date;
        if start >= stop {
            self.record.anomalies.inverted += 1;
            return Some(ParseWarning::InvertedBoundary { date, slot });
        }

        let boundary = SessionBoundary {
            start: self.midnight + TimeDelta::seconds(start),
            end: self.midnight + TimeDelta::seconds(stop),
            slot,
        };
        let overlaps = self
            .record
            .boundaries
            .iter()
            .any(|earlier| boundary.start < earlier.end && earlier.start < boundary.end);
        if overlaps {
            self.record.anomalies.overlapping += 1;
            return Some(ParseWarning::OverlappingBoundary { date, slot });
        }

        trace!(%date, slot, start = %boundary.start, end = %boundary.end, "Summary boundary");
        self.record.boundaries.push(boundary);
        None
    }
}

/// Calendar day covered by data record `record`.
fn day_of_record(header: &Header, record: usize) -> Result<NaiveDate> {
    let offset = (record as f64 * header.record_duration / SECONDS_PER_DAY).floor() as u64;
    header.start.date().checked_add_days(Days::new(offset)).ok_or_else(|| {
        CpapError::header_parse(
            "Summary layout",
            format!("record {} lies beyond the representable date range", record),
        )
    })
}

fn record_samples<'a>(data: &'a [Vec<i16>], signal: &SignalDescriptor, record: usize) -> &'a [i16] {
    let per = signal.samples_per_record;
    data.get(signal.index)
        .and_then(|samples| samples.get(record * per..(record + 1) * per))
        .unwrap_or_default()
}

/// Seconds since midnight for a mask-on/mask-off digital value.
fn seconds_of(signal: &SignalDescriptor, digital: i16) -> i64 {
    let value = i64::from(digital);
    if signal.unit.eq_ignore_ascii_case("min") { value * 60 } else { value }
}
