//! Signal descriptors and the digital-to-physical conversion law.

use crate::channels::{ChannelId, ChannelSpec};
use serde::Serialize;
use std::fmt;

/// Why a signal's digital samples cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NonDecodable {
    /// `digital_min == digital_max`; the gain is undefined.
    DegenerateDigitalRange { digital: i32 },
    /// The signal carries EDF+ annotation bytes, not samples.
    Annotation,
}

impl fmt::Display for NonDecodable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonDecodable::DegenerateDigitalRange { digital } => {
                write!(f, "degenerate digital range [{}, {}]", digital, digital)
            }
            NonDecodable::Annotation => write!(f, "annotation signal"),
        }
    }
}

/// Cached conversion for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Decoding {
    /// `physical = gain * digital + offset`.
    Linear { gain: f64, offset: f64 },
    NonDecodable(NonDecodable),
}

impl Decoding {
    pub fn is_decodable(&self) -> bool {
        matches!(self, Decoding::Linear { .. })
    }
}

/// Apply the conversion law to one digital value.
///
/// Evaluated as `(d - dmin) * (pmax - pmin) / (dmax - dmin) + pmin` so that
/// integer-exact ranges decode exactly.
#[inline]
pub fn convert(digital: i16, dmin: i32, dmax: i32, pmin: f64, pmax: f64) -> f64 {
    (f64::from(digital) - f64::from(dmin)) * (pmax - pmin) / (f64::from(dmax) - f64::from(dmin))
        + pmin
}

/// One signal's header fields, resolved against the channel catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDescriptor {
    /// Position of the signal in the file.
    pub index: usize,
    pub label: String,
    pub transducer: String,
    /// Physical dimension exactly as written in the file.
    pub dimension: String,
    /// Unit after dialect resolution (may come from the catalog).
    pub unit: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
    /// Catalog entry, `None` for raw-label passthrough signals.
    pub channel: Option<&'static ChannelSpec>,
    pub decoding: Decoding,
}

impl SignalDescriptor {
    /// Compute the cached decoding for the given ranges.
    pub fn decoding_for(dmin: i32, dmax: i32, pmin: f64, pmax: f64) -> Decoding {
        if dmin == dmax {
            return Decoding::NonDecodable(NonDecodable::DegenerateDigitalRange { digital: dmin });
        }
        let gain = (pmax - pmin) / (f64::from(dmax) - f64::from(dmin));
        Decoding::Linear { gain, offset: pmin - gain * f64::from(dmin) }
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel.map(|spec| spec.id)
    }

    /// Canonical name if the label is catalogued, the raw label otherwise.
    pub fn name(&self) -> &str {
        self.channel.map_or(self.label.as_str(), |spec| spec.name)
    }

    pub fn is_decodable(&self) -> bool {
        self.decoding.is_decodable()
    }

    /// Convert one digital value, `None` when the signal is non-decodable.
    pub fn physical(&self, digital: i16) -> Option<f64> {
        self.is_decodable().then(|| {
            convert(digital, self.digital_min, self.digital_max, self.physical_min, self.physical_max)
        })
    }

    /// Whether `digital` lies within the declared digital range.
    pub fn in_digital_range(&self, digital: i16) -> bool {
        let value = i32::from(digital);
        value >= self.digital_min.min(self.digital_max)
            && value <= self.digital_max.max(self.digital_min)
    }

    /// Multiplier from this signal's unit to the catalog's canonical unit.
    pub fn canonical_scale(&self) -> f64 {
        self.channel.map_or(1.0, |spec| spec.factor_from(&self.unit))
    }
}

/// Result of [`crate::edf::EdfReader::get_physical_values`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoded<'a> {
    Physical(&'a [f64]),
    /// Digital samples of a non-decodable signal.
    Raw(&'a [i16]),
}

impl<'a> Decoded<'a> {
    pub fn as_physical(&self) -> Option<&'a [f64]> {
        match *self {
            Decoded::Physical(values) => Some(values),
            Decoded::Raw(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Decoded::Physical(values) => values.len(),
            Decoded::Raw(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn midpoint_of_integer_range_is_exact() {
        assert_eq!(convert(500, 0, 1000, 0.0, 10.0), 5.0);
        assert_eq!(convert(-32768, -32768, 32767, -1.0, 1.0), -1.0);
        assert_eq!(convert(32767, -32768, 32767, -1.0, 1.0), 1.0);
    }

    #[test]
    fn degenerate_range_is_not_decodable() {
        let decoding = SignalDescriptor::decoding_for(0, 0, 0.0, 1.0);
        assert_eq!(
            decoding,
            Decoding::NonDecodable(NonDecodable::DegenerateDigitalRange { digital: 0 })
        );
        assert!(!decoding.is_decodable());
    }

    #[test]
    fn cached_gain_and_offset_agree_with_the_law() {
        let Decoding::Linear { gain, offset } =
            SignalDescriptor::decoding_for(-2048, 2047, -20.0, 40.0)
        else {
            panic!("expected a linear decoding");
        };
        for digital in [-2048i16, -1, 0, 1000, 2047] {
            let law = convert(digital, -2048, 2047, -20.0, 40.0);
            assert!((gain * f64::from(digital) + offset - law).abs() < 1e-9);
        }
    }

    proptest! {
        #[test]
        fn integer_exact_ranges_round_trip(
            dmin in -1000i32..0,
            span in 1i32..1000,
            scale in 1i32..5,
            digital_offset in 0i32..1000
        ) {
            // Physical range equal to the digital range times an integer factor.
            let dmax = dmin + span;
            let digital = (dmin + digital_offset % (span + 1)) as i16;
            let physical = f64::from(i32::from(digital) * scale);
            let decoded = convert(
                digital,
                dmin,
                dmax,
                f64::from(dmin * scale),
                f64::from(dmax * scale),
            );
            prop_assert_eq!(decoded, physical);
        }
    }
}
