//! Core types shared by the parsers, the scanner and the reconciler.
//!
//! ## Architecture
//!
//! - [`SignalDescriptor`] describes one EDF signal with a cached [`Decoding`]
//! - [`SummaryRecord`] holds one day of the summary file: [`DayStatistics`]
//!   and sorted [`SessionBoundary`] entries
//! - [`DeviceFile`] and [`FileGroup`] are the scanner's view of `DATALOG`
//! - [`Session`] is the reconciler's output, with per-group [`Attribution`]s
//! - [`ParseWarning`] records every tolerated deviation
//!
//! ## Usage Example
//!
//! ```rust
//! use cpap_sd::types::{Decoding, SignalDescriptor, convert};
//!
//! assert_eq!(convert(500, 0, 1000, 0.0, 10.0), 5.0);
//!
//! let decoding = SignalDescriptor::decoding_for(0, 1000, 0.0, 10.0);
//! let Decoding::Linear { gain, offset } = decoding else { unreachable!() };
//! assert!((gain * 500.0 + offset - 5.0).abs() < 1e-12);
//! ```

mod device_file;
mod session;
mod signal;
mod summary;
mod warning;

pub use device_file::{DeviceFile, FileGroup, FileKind, FileStamp, GroupKey};
pub use session::{Attribution, Disposition, Session, SessionBoundary, TimeWindow, WindowSource};
pub use signal::{Decoded, Decoding, NonDecodable, SignalDescriptor, convert};
pub use summary::{BoundaryAnomalies, DayStatistics, SummaryRecord};
pub use warning::ParseWarning;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels;
    use proptest::prelude::*;

    prop_compose! {
        fn arb_descriptor()(
            dmin in -32768i32..0,
            span in 1i32..32767,
            pmin in -1000.0f64..1000.0,
            pspan in 0.0f64..1000.0,
            label in prop::sample::select(vec!["Flow.40ms", "Press.2s", "Vendor.X", "Leak.2s"]),
        ) -> SignalDescriptor {
            let dmax = dmin + span;
            SignalDescriptor {
                index: 0,
                label: label.to_string(),
                transducer: String::new(),
                dimension: String::new(),
                unit: String::new(),
                physical_min: pmin,
                physical_max: pmin + pspan,
                digital_min: dmin,
                digital_max: dmax,
                prefilter: String::new(),
                samples_per_record: 1,
                channel: channels::lookup(label).ok(),
                decoding: SignalDescriptor::decoding_for(dmin, dmax, pmin, pmin + pspan),
            }
        }
    }

    proptest! {
        #[test]
        fn physical_values_stay_within_the_physical_range(
            descriptor in arb_descriptor(),
            fraction in 0.0f64..=1.0
        ) {
            let span = f64::from(descriptor.digital_max - descriptor.digital_min);
            let digital = (f64::from(descriptor.digital_min) + (fraction * span).round()) as i16;
            prop_assert!(descriptor.in_digital_range(digital));
            let value = descriptor.physical(digital).expect("linear decoding");
            let tolerance = 1e-9 * descriptor.physical_max.abs().max(1.0);
            prop_assert!(value >= descriptor.physical_min - tolerance);
            prop_assert!(value <= descriptor.physical_max + tolerance);
        }

        #[test]
        fn cached_decoding_matches_the_law(
            descriptor in arb_descriptor(),
            digital in any::<i16>()
        ) {
            let Decoding::Linear { gain, offset } = descriptor.decoding else {
                return Err(TestCaseError::fail("expected linear decoding"));
            };
            let law = convert(
                digital,
                descriptor.digital_min,
                descriptor.digital_max,
                descriptor.physical_min,
                descriptor.physical_max,
            );
            let cached = gain * f64::from(digital) + offset;
            let magnitude = (gain.abs() * 32768.0 + offset.abs()).max(1.0);
            prop_assert!((law - cached).abs() <= 1e-9 * magnitude);
        }
    }

    #[test]
    fn passthrough_signals_use_their_raw_label() {
        let mut descriptor = SignalDescriptor {
            index: 3,
            label: "Vendor.X".to_string(),
            transducer: String::new(),
            dimension: "L/s".to_string(),
            unit: "L/s".to_string(),
            physical_min: 0.0,
            physical_max: 1.0,
            digital_min: 0,
            digital_max: 1,
            prefilter: String::new(),
            samples_per_record: 1,
            channel: None,
            decoding: SignalDescriptor::decoding_for(0, 1, 0.0, 1.0),
        };
        assert_eq!(descriptor.name(), "Vendor.X");
        assert_eq!(descriptor.canonical_scale(), 1.0);

        descriptor.channel = channels::lookup("Flow.40ms").ok();
        assert_eq!(descriptor.name(), "Flow Rate");
        assert_eq!(descriptor.canonical_scale(), 60.0);
    }
}
