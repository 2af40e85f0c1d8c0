//! Dialects: how strictly signal headers are interpreted.
//!
//! The generic reader delegates the two decisions that differ between
//! well-formed waveform files and the device's summary file: which unit a
//! signal carries, and what to do with unusable physical-range fields.

use super::format::{RawSignalHeader, parse_number};
use crate::channels::ChannelSpec;
use crate::{CpapError, Result};
use std::fmt;

/// Unit chosen for a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitResolution {
    /// The dimension field as written.
    Declared(String),
    /// The dimension field was unusable; the catalog unit replaces it.
    Fallback(String),
}

/// Physical range chosen for a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicalRange {
    Declared { min: f64, max: f64 },
    /// The physical fields were unusable; the digital range is used, which
    /// makes the conversion an identity.
    DigitalFallback { min: f64, max: f64 },
}

impl PhysicalRange {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            PhysicalRange::Declared { min, max } | PhysicalRange::DigitalFallback { min, max } => {
                (min, max)
            }
        }
    }
}

/// Interpretation rules plugged into [`super::EdfReader`].
pub trait Dialect: fmt::Debug + Default + Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &'static str;

    /// Choose the unit for a signal.
    fn resolve_unit(&self, raw: &RawSignalHeader, channel: Option<&ChannelSpec>)
    -> UnitResolution;

    /// Choose the physical range for a signal with the given digital range.
    fn physical_range(&self, raw: &RawSignalHeader, digital: (i32, i32)) -> Result<PhysicalRange>;
}

/// Nominal EDF: the file's fields are taken at their word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StandardDialect;

impl Dialect for StandardDialect {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn resolve_unit(
        &self,
        raw: &RawSignalHeader,
        _channel: Option<&ChannelSpec>,
    ) -> UnitResolution {
        UnitResolution::Declared(raw.dimension.trim().to_string())
    }

    fn physical_range(&self, raw: &RawSignalHeader, digital: (i32, i32)) -> Result<PhysicalRange> {
        if digital.0 > digital.1 {
            return Err(CpapError::header_parse(
                "Signal header",
                format!(
                    "signal '{}' has inverted digital range [{}, {}]",
                    raw.label, digital.0, digital.1
                ),
            ));
        }

        let min: f64 = parse_number("physical min", &raw.physical_min)?;
        let max: f64 = parse_number("physical max", &raw.physical_max)?;

        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(CpapError::header_parse(
                "Signal header",
                format!("signal '{}' has invalid physical range [{}, {}]", raw.label, min, max),
            ));
        }

        Ok(PhysicalRange::Declared { min, max })
    }
}

/// Whether a dimension field holds a plausible unit string.
pub fn is_plausible_unit(dimension: &str) -> bool {
    let dimension = dimension.trim();
    !dimension.is_empty()
        && dimension.chars().all(|c| c.is_ascii_graphic() || c == ' ')
        && dimension.chars().any(|c| c.is_ascii_alphabetic() || c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, dimension: &str, min: &str, max: &str) -> RawSignalHeader {
        RawSignalHeader {
            label: label.to_string(),
            dimension: dimension.to_string(),
            physical_min: min.to_string(),
            physical_max: max.to_string(),
            ..RawSignalHeader::default()
        }
    }

    #[test]
    fn standard_dialect_keeps_declared_units() {
        let unit = StandardDialect.resolve_unit(&raw("Vendor.X", " mbar ", "0", "1"), None);
        assert_eq!(unit, UnitResolution::Declared("mbar".to_string()));
    }

    #[test]
    fn standard_dialect_rejects_malformed_ranges() {
        let dialect = StandardDialect;
        assert!(dialect.physical_range(&raw("A", "", "abc", "1"), (0, 1)).is_err());
        assert!(dialect.physical_range(&raw("A", "", "5", "1"), (0, 1)).is_err());
        let range = dialect.physical_range(&raw("A", "", "-2.5", "2.5"), (0, 1)).unwrap();
        assert_eq!(range.bounds(), (-2.5, 2.5));
    }

    #[test]
    fn standard_dialect_rejects_inverted_digital_ranges() {
        let err = StandardDialect.physical_range(&raw("Flow", "", "0", "1"), (1000, -1000));
        assert!(matches!(err, Err(CpapError::HeaderParse { ref details, .. }) if details.contains("inverted")));
        assert!(StandardDialect.physical_range(&raw("Flow", "", "0", "1"), (7, 7)).is_ok());
    }

    #[test]
    fn unit_plausibility() {
        assert!(is_plausible_unit("cmH2O"));
        assert!(is_plausible_unit("%"));
        assert!(is_plausible_unit("L/min"));
        assert!(!is_plausible_unit(""));
        assert!(!is_plausible_unit("   "));
        assert!(!is_plausible_unit("0.0"));
        assert!(!is_plausible_unit("\u{fffd}\u{fffd}"));
    }
}
