//! EDF file format structures and parsing
//!
//! ## EDF File Structure
//!
//! 1. **Main Header** (256 bytes) - fixed-width ASCII fields
//! 2. **Signal Headers** (256 bytes per signal) - stored per attribute: every
//!    label first, then every transducer, then every dimension, and so on
//! 3. **Data Records** - for each record, every signal's `samples_per_record`
//!    little-endian `i16` values in signal order
//!
//! Numeric fields are ASCII text padded with spaces. Dates are `dd.mm.yy`
//! with two-digit years below 85 in the 2000s.

use crate::bytes::ByteReader;
use crate::{CpapError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, trace};

/// Size of the fixed main header.
pub const HEADER_SIZE: usize = 256;
/// Bytes of header per signal.
pub const SIGNAL_HEADER_SIZE: usize = 256;
/// Sanity limit on the declared signal count.
pub const MAX_SIGNALS: usize = 4096;

const VERSION_WIDTH: usize = 8;
const PATIENT_WIDTH: usize = 80;
const RECORDING_WIDTH: usize = 80;
const DATE_WIDTH: usize = 8;
const TIME_WIDTH: usize = 8;
const HEADER_BYTES_WIDTH: usize = 8;
const RESERVED_WIDTH: usize = 44;
const RECORD_COUNT_WIDTH: usize = 8;
const RECORD_DURATION_WIDTH: usize = 8;
const SIGNAL_COUNT_WIDTH: usize = 4;

/// Main EDF header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    /// Recording start, device local time.
    pub start: NaiveDateTime,
    /// Declared size of main plus signal headers.
    pub header_bytes: usize,
    pub reserved: String,
    /// `None` when the header declares `-1` (unknown). The reader fills it in
    /// from the file size once the record layout is known.
    pub record_count: Option<usize>,
    /// Seconds per data record.
    pub record_duration: f64,
    pub signal_count: usize,
}

impl Header {
    /// Parse the 256-byte main header at the reader's cursor.
    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        trace!("Reading EDF header ({} bytes)", HEADER_SIZE);

        let version = reader.read_ascii("version", VERSION_WIDTH)?;
        let patient_id = reader.read_ascii("patient", PATIENT_WIDTH)?;
        let recording_id = reader.read_ascii("recording", RECORDING_WIDTH)?;
        let start_date = reader.read_ascii("start date", DATE_WIDTH)?;
        let start_time = reader.read_ascii("start time", TIME_WIDTH)?;
        let header_bytes = reader.read_ascii("header bytes", HEADER_BYTES_WIDTH)?;
        let reserved = reader.read_ascii("reserved", RESERVED_WIDTH)?;
        let record_count = reader.read_ascii("record count", RECORD_COUNT_WIDTH)?;
        let record_duration = reader.read_ascii("record duration", RECORD_DURATION_WIDTH)?;
        let signal_count = reader.read_ascii("signal count", SIGNAL_COUNT_WIDTH)?;

        let start = parse_start(&start_date, &start_time)?;
        let header_bytes: usize = parse_number("header bytes", &header_bytes)?;
        let declared_records: i64 = parse_number("record count", &record_count)?;
        let record_duration: f64 = parse_number("record duration", &record_duration)?;
        let signal_count: i64 = parse_number("signal count", &signal_count)?;

        let record_count = match declared_records {
            -1 => None,
            n if n >= 0 => Some(n as usize),
            n => {
                return Err(CpapError::header_parse(
                    "Header validation",
                    format!("record count {} is negative", n),
                ));
            }
        };

        if signal_count <= 0 || signal_count as usize > MAX_SIGNALS {
            return Err(CpapError::header_parse(
                "Header validation",
                format!("signal count {} outside 1..={}", signal_count, MAX_SIGNALS),
            ));
        }

        let header = Self {
            version,
            patient_id,
            recording_id,
            start,
            header_bytes,
            reserved,
            record_count,
            record_duration,
            signal_count: signal_count as usize,
        };

        debug!(
            "Parsed EDF header: start={}, records={:?}, duration={}, signals={}",
            header.start, header.record_count, header.record_duration, header.signal_count
        );

        Ok(header)
    }

    /// Reject version tags and values no supported device writes.
    pub fn validate(&self) -> Result<()> {
        if self.version != "0" {
            return Err(CpapError::header_parse(
                "Header validation",
                format!("unrecognized version tag '{}'", self.version),
            ));
        }

        if !self.record_duration.is_finite() || self.record_duration < 0.0 {
            return Err(CpapError::header_parse(
                "Header validation",
                format!("record duration {} is invalid", self.record_duration),
            ));
        }

        Ok(())
    }

    /// Header size implied by the signal count.
    pub fn expected_header_bytes(&self) -> usize {
        HEADER_SIZE + self.signal_count * SIGNAL_HEADER_SIZE
    }

    /// Total recording length in seconds, once the record count is known.
    pub fn duration(&self) -> Option<f64> {
        self.record_count.map(|records| records as f64 * self.record_duration)
    }

    /// Recording end instant, once the record count is known.
    pub fn end(&self) -> Option<NaiveDateTime> {
        let millis = (self.duration()? * 1000.0).round() as i64;
        self.start.checked_add_signed(chrono::TimeDelta::milliseconds(millis))
    }

    pub fn is_edf_plus(&self) -> bool {
        self.reserved.starts_with("EDF+")
    }

    /// EDF+D: data records are not contiguous in time.
    pub fn is_discontinuous(&self) -> bool {
        self.reserved.starts_with("EDF+D")
    }

    /// Device serial from the `SRN=` token of the recording field.
    pub fn serial_number(&self) -> Option<&str> {
        self.recording_id
            .split_whitespace()
            .find_map(|token| token.strip_prefix("SRN="))
            .filter(|serial| !serial.is_empty())
    }
}

/// Raw per-signal header text, before dialect interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSignalHeader {
    pub label: String,
    pub transducer: String,
    pub dimension: String,
    pub physical_min: String,
    pub physical_max: String,
    pub digital_min: String,
    pub digital_max: String,
    pub prefilter: String,
    pub samples_per_record: String,
    pub reserved: String,
}

/// Read `count` signal headers stored per attribute at the reader's cursor.
pub fn read_signal_headers(reader: &mut ByteReader, count: usize) -> Result<Vec<RawSignalHeader>> {
    let mut labels = read_column(reader, "label", 16, count)?;
    let mut transducers = read_column(reader, "transducer", 80, count)?;
    let mut dimensions = read_column(reader, "dimension", 8, count)?;
    let mut physical_mins = read_column(reader, "physical min", 8, count)?;
    let mut physical_maxs = read_column(reader, "physical max", 8, count)?;
    let mut digital_mins = read_column(reader, "digital min", 8, count)?;
    let mut digital_maxs = read_column(reader, "digital max", 8, count)?;
    let mut prefilters = read_column(reader, "prefilter", 80, count)?;
    let mut samples = read_column(reader, "samples per record", 8, count)?;
    let mut reserved = read_column(reader, "signal reserved", 32, count)?;

    let raw = (0..count)
        .map(|i| RawSignalHeader {
            label: std::mem::take(&mut labels[i]),
            transducer: std::mem::take(&mut transducers[i]),
            dimension: std::mem::take(&mut dimensions[i]),
            physical_min: std::mem::take(&mut physical_mins[i]),
            physical_max: std::mem::take(&mut physical_maxs[i]),
            digital_min: std::mem::take(&mut digital_mins[i]),
            digital_max: std::mem::take(&mut digital_maxs[i]),
            prefilter: std::mem::take(&mut prefilters[i]),
            samples_per_record: std::mem::take(&mut samples[i]),
            reserved: std::mem::take(&mut reserved[i]),
        })
        .collect();

    trace!("Read {} raw signal headers", count);
    Ok(raw)
}

fn read_column(
    reader: &mut ByteReader,
    field: &str,
    width: usize,
    count: usize,
) -> Result<Vec<String>> {
    (0..count).map(|_| reader.read_ascii(field, width)).collect()
}

/// Parse a trimmed numeric header field.
pub fn parse_number<T: FromStr>(field: &str, text: &str) -> Result<T> {
    text.trim().parse().map_err(|_| {
        CpapError::header_parse("Numeric field", format!("{} '{}' is not a number", field, text))
    })
}

/// Parse `dd.mm.yy` and `hh.mm.ss`. Two-digit years below 85 are 20xx.
pub fn parse_start(date: &str, time: &str) -> Result<NaiveDateTime> {
    let invalid = || {
        CpapError::header_parse(
            "Start timestamp",
            format!("'{} {}' is not a valid dd.mm.yy hh.mm.ss timestamp", date, time),
        )
    };

    let [day, month, year] = split_triplet(date).ok_or_else(invalid)?;
    let [hour, minute, second] = split_triplet(time).ok_or_else(invalid)?;

    let year = if year < 85 { 2000 + year } else { 1900 + year };
    let date = NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;
    Ok(date.and_time(time))
}

fn split_triplet(text: &str) -> Option<[u32; 3]> {
    let mut parts = text.trim().split(['.', ':']).map(|part| part.trim().parse::<u32>().ok());
    let triplet = [parts.next()??, parts.next()??, parts.next()??];
    parts.next().is_none().then_some(triplet)
}
