//! Tolerated deviations recorded on parse outputs.

use super::NonDecodable;
use crate::channels::ChannelId;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// A deviation from the nominal format that did not abort the parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParseWarning {
    /// The header declared `-1` records; the count was derived from the file size.
    DerivedRecordCount { records: usize },
    /// Bytes left over after the last complete data record.
    TrailingBytes { bytes: usize },
    /// The header-size field disagrees with the signal count.
    HeaderSizeMismatch { declared: usize, expected: usize },
    UnknownChannel { signal: usize, label: String },
    /// The dimension field was empty or unreadable; the catalog unit was used.
    UnitFallback { signal: usize, label: String, dimension: String, unit: String },
    /// Physical range fields were malformed; the digital range was used instead.
    MalformedPhysicalRange { signal: usize, label: String, physical_min: String, physical_max: String },
    NonDecodable { signal: usize, label: String, reason: NonDecodable },
    /// A required summary channel is missing from the file.
    MissingChannel { channel: ChannelId },
    /// A mask-on/mask-off pair with `start >= stop` was dropped.
    InvertedBoundary { date: NaiveDate, slot: usize },
    /// A mask-on/mask-off pair overlapping an earlier boundary was dropped.
    OverlappingBoundary { date: NaiveDate, slot: usize },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::DerivedRecordCount { records } => {
                write!(f, "record count derived from file size: {}", records)
            }
            ParseWarning::TrailingBytes { bytes } => {
                write!(f, "{} trailing bytes after last data record", bytes)
            }
            ParseWarning::HeaderSizeMismatch { declared, expected } => {
                write!(f, "header declares {} bytes, signal count implies {}", declared, expected)
            }
            ParseWarning::UnknownChannel { signal, label } => {
                write!(f, "signal {} label '{}' is not catalogued", signal, label)
            }
            ParseWarning::UnitFallback { signal, label, dimension, unit } => write!(
                f,
                "signal {} '{}': dimension '{}' replaced by catalog unit '{}'",
                signal, label, dimension, unit
            ),
            ParseWarning::MalformedPhysicalRange { signal, label, physical_min, physical_max } => {
                write!(
                    f,
                    "signal {} '{}': physical range '{}'..'{}' unusable, using digital range",
                    signal, label, physical_min, physical_max
                )
            }
            ParseWarning::NonDecodable { signal, label, reason } => {
                write!(f, "signal {} '{}' is not decodable: {}", signal, label, reason)
            }
            ParseWarning::MissingChannel { channel } => {
                write!(f, "channel {:?} not present", channel)
            }
            ParseWarning::InvertedBoundary { date, slot } => {
                write!(f, "{} slot {}: mask-on is not before mask-off", date, slot)
            }
            ParseWarning::OverlappingBoundary { date, slot } => {
                write!(f, "{} slot {}: overlaps an earlier session", date, slot)
            }
        }
    }
}
