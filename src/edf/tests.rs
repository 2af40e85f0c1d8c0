use super::*;
use crate::CpapError;
use crate::channels::ChannelId;
use crate::checksum::{ChecksumVerifier, CrcMode, CrcStatus};
use crate::test_utils::{CardBuilder, EdfBuilder};
use crate::types::{Decoded, NonDecodable, ParseWarning};
use anyhow::{Context, Result, ensure};
use proptest::prelude::*;

fn three_signal_file() -> EdfBuilder {
    EdfBuilder::new()
        .start("01.01.24", "23.00.00")
        .record_duration(2.0)
        .records(2)
        .signal("Press.2s", "cmH2O", (0.0, 10.0), (0, 1000), 1)
        .samples(&[500, 1000])
        .signal("Flow.40ms", "L/s", (-2.0, 2.0), (-1000, 1000), 3)
        .samples(&[-1000, 0, 1000, 500, -500, 250])
        .signal("Vendor.Unknown", "", (0.0, 1.0), (0, 1), 2)
        .samples(&[0, 1, 1, 0])
}

#[test]
fn decodes_three_signal_file() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;

    assert_eq!(reader.parse_header()?.signal_count, 3);
    assert_eq!(reader.record_count()?, 2);

    let pressure = reader.get_physical_values(0)?;
    assert_eq!(pressure.as_physical(), Some(&[5.0, 10.0][..]));

    let flow = reader.get_physical_values(1)?.as_physical().context("flow decodes")?.to_vec();
    assert_eq!(flow, vec![-2.0, 0.0, 2.0, 1.0, -1.0, 0.5]);

    assert_eq!(reader.digital_samples(2)?, &[0, 1, 1, 0]);
    assert_eq!(reader.sample_rate(1)?, 1.5);
    Ok(())
}

#[test]
fn records_interleave_per_signal() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    let data = reader.parse_data()?;
    ensure!(data.len() == 3, "one buffer per signal");
    assert_eq!(data[0], vec![500, 1000]);
    assert_eq!(data[1], vec![-1000, 0, 1000, 500, -500, 250]);
    assert_eq!(data[2], vec![0, 1, 1, 0]);
    Ok(())
}

#[test]
fn phases_run_in_any_order() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    assert!(reader.header().is_none());

    reader.parse_data()?;
    assert!(reader.header().is_some());
    assert_eq!(reader.parse_signal_headers()?.len(), 3);
    Ok(())
}

#[test]
fn physical_values_are_cached() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    let first = reader.get_physical_values(1)?.as_physical().context("decodes")?.to_vec();
    let first_ptr = reader.get_physical_values(1)?.as_physical().context("decodes")?.as_ptr();
    let second_ptr = reader.get_physical_values(1)?.as_physical().context("decodes")?.as_ptr();
    assert_eq!(first_ptr, second_ptr);
    assert_eq!(reader.get_physical_values(1)?.as_physical(), Some(first.as_slice()));
    Ok(())
}

#[test]
fn canonical_values_apply_catalog_scale() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    let flow = reader.canonical_values(1)?.context("flow decodes")?;
    assert_eq!(flow[0], -120.0);
    assert_eq!(flow[2], 120.0);
    assert_eq!(reader.find_channel(ChannelId::FlowRate)?, Some(1));
    assert_eq!(reader.find_channel(ChannelId::Spo2)?, None);
    Ok(())
}

#[test]
fn unknown_labels_pass_through() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    let signal = reader.signal(2)?.clone();
    assert_eq!(signal.label, "Vendor.Unknown");
    assert!(signal.channel.is_none());
    assert!(signal.is_decodable());
    assert!(reader.warnings().iter().any(|warning| matches!(
        warning,
        ParseWarning::UnknownChannel { signal: 2, label } if label == "Vendor.Unknown"
    )));
    assert_eq!(reader.signal_index("vendor.unknown ")?, Some(2));
    Ok(())
}

#[test]
fn degenerate_digital_range_yields_raw_samples() -> Result<()> {
    let bytes = EdfBuilder::new()
        .signal("Press.2s", "cmH2O", (0.0, 10.0), (7, 7), 2)
        .samples(&[7, 7])
        .build();
    let mut reader = EdfReader::from_bytes(bytes)?;

    match reader.get_physical_values(0)? {
        Decoded::Raw(samples) => assert_eq!(samples, &[7, 7]),
        Decoded::Physical(_) => panic!("degenerate range must not decode"),
    }
    assert!(reader.canonical_values(0)?.is_none());
    assert!(reader.warnings().iter().any(|warning| matches!(
        warning,
        ParseWarning::NonDecodable { reason: NonDecodable::DegenerateDigitalRange { digital: 7 }, .. }
    )));
    Ok(())
}

#[test]
fn unknown_record_count_is_derived() -> Result<()> {
    let bytes = EdfBuilder::new()
        .signal("Press.2s", "cmH2O", (0.0, 10.0), (0, 1000), 2)
        .records(3)
        .declared_records(-1)
        .build();
    let mut reader = EdfReader::from_bytes(bytes)?;
    assert_eq!(reader.record_count()?, 3);
    assert_eq!(reader.digital_samples(0)?.len(), 6);
    assert!(reader.warnings().contains(&ParseWarning::DerivedRecordCount { records: 3 }));
    Ok(())
}

#[test]
fn trailing_bytes_are_tolerated() -> Result<()> {
    let mut bytes = EdfBuilder::new()
        .signal("Press.2s", "cmH2O", (0.0, 10.0), (0, 1000), 2)
        .records(1)
        .build();
    bytes.extend_from_slice(&[0xAA; 3]);
    let mut reader = EdfReader::from_bytes(bytes)?;
    assert_eq!(reader.digital_samples(0)?.len(), 2);
    assert!(reader.warnings().contains(&ParseWarning::TrailingBytes { bytes: 3 }));
    Ok(())
}

#[test]
fn truncated_data_is_out_of_bounds() -> Result<()> {
    let mut bytes = EdfBuilder::new()
        .signal("Press.2s", "cmH2O", (0.0, 10.0), (0, 1000), 4)
        .records(2)
        .build();
    bytes.truncate(bytes.len() - 3);
    let mut reader = EdfReader::from_bytes(bytes)?;

    reader.parse_signal_headers()?;
    let result = reader.parse_data();
    assert!(matches!(result, Err(CpapError::OutOfBounds { .. })));
    // The failed phase leaves no partial state behind.
    assert!(matches!(reader.parse_data(), Err(CpapError::OutOfBounds { .. })));
    Ok(())
}

#[test]
fn out_of_range_signal_index() -> Result<()> {
    let mut reader = EdfReader::from_bytes(three_signal_file().build())?;
    let result = reader.get_physical_values(7);
    assert!(matches!(result, Err(CpapError::SignalIndex { index: 7, count: 3 })));
    Ok(())
}

#[test]
fn standard_dialect_rejects_malformed_physical_range() -> Result<()> {
    let bytes = EdfBuilder::new()
        .signal_raw("Press.2s", "cmH2O", "garbage", "10", (0, 1000), 1)
        .build();
    let mut reader = EdfReader::from_bytes(bytes)?;
    assert!(matches!(reader.parse_signal_headers(), Err(CpapError::HeaderParse { .. })));
    assert!(reader.warnings().is_empty());
    Ok(())
}

#[test]
fn standard_dialect_rejects_inverted_digital_range() -> Result<()> {
    let bytes = EdfBuilder::new()
        .signal("Flow.40ms", "L/s", (-2.0, 2.0), (1000, -1000), 4)
        .build();
    let mut reader = EdfReader::from_bytes(bytes)?;
    assert!(matches!(reader.parse_signal_headers(), Err(CpapError::HeaderParse { .. })));
    Ok(())
}

#[test]
fn gzip_files_are_inflated_transparently() -> Result<()> {
    let builder = three_signal_file();
    let mut plain = EdfReader::from_bytes(builder.build())?;
    let mut packed = EdfReader::from_bytes(builder.build_gzip())?;

    assert!(packed.was_compressed());
    assert!(!plain.was_compressed());
    assert_eq!(packed.parse_header()?, plain.parse_header()?);
    assert_eq!(packed.parse_data()?, plain.parse_data()?);
    Ok(())
}

#[test]
fn peek_reads_only_the_main_header() -> Result<()> {
    let card = CardBuilder::new()?;
    let builder = three_signal_file();
    let plain = card.datalog_file("20240101", "20240101_230000_BRP.edf", &builder.build())?;
    let packed = card.datalog_file("20240101", "20240101_230000_PLD.edf.gz", &builder.build_gzip())?;

    for path in [plain, packed] {
        let header = peek_header(&path).with_context(|| format!("peeking {}", path.display()))?;
        assert_eq!(header.start.to_string(), "2024-01-01 23:00:00");
        assert_eq!(header.duration(), Some(4.0));
    }
    Ok(())
}

#[test]
fn open_with_verifies_checksum_siblings() -> Result<()> {
    let card = CardBuilder::new()?;
    let path = card.datalog_file("20240101", "20240101_230000_BRP.edf", &three_signal_file().build())?;

    let strict = ChecksumVerifier::new(CrcMode::Strict);
    assert!(matches!(
        EdfReader::open_with(&path, StandardDialect, &strict),
        Err(CpapError::Checksum { .. })
    ));

    card.with_crc(&path)?;
    let reader = EdfReader::open_with(&path, StandardDialect, &strict)?;
    assert!(reader.crc_status().is_verified());
    assert_eq!(EdfReader::open(&path)?.crc_status(), CrcStatus::Skipped);
    Ok(())
}

#[test]
fn missing_file_is_a_file_error() {
    let result = EdfReader::open("/nonexistent/20240101_230000_BRP.edf");
    assert!(matches!(result, Err(CpapError::File { .. })));
}

#[test]
fn annotations_are_extracted_from_event_files() -> Result<()> {
    let bytes = EdfBuilder::new()
        .start("01.01.24", "23.00.00")
        .reserved("EDF+C")
        .record_duration(60.0)
        .records(2)
        .annotations(
            32,
            &[
                &b"+0\x14\x14\x00+12.5\x1510\x14Obstructive Apnea\x14\x00"[..],
                &b"+60\x14\x14\x00+75\x1512\x14Hypopnea\x14\x00"[..],
            ],
        )
        .build();
    let mut reader = EdfReader::from_bytes(bytes)?;

    assert!(reader.parse_header()?.is_edf_plus());
    assert!(matches!(reader.get_physical_values(0)?, Decoded::Raw(_)));

    let annotations = reader.annotations()?;
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].kind(), EventKind::ObstructiveApnea);
    assert_eq!(annotations[0].duration, Some(10.0));
    assert_eq!(annotations[1].kind(), EventKind::Hypopnea);

    let start = reader.parse_header()?.start;
    assert_eq!(
        annotations[1].at(start).map(|t| t.to_string()).as_deref(),
        Some("2024-01-01 23:01:15")
    );
    Ok(())
}

proptest! {
    #[test]
    fn decoded_values_follow_the_linear_law(
        dmin in -32768i32..0,
        span in 1i32..32767,
        pmin in -500.0f64..500.0,
        pspan in 0.1f64..500.0,
        fractions in prop::collection::vec(0.0f64..=1.0, 1..16),
    ) {
        let dmax = dmin + span;
        let pmax = pmin + pspan;
        let samples: Vec<i16> = fractions
            .iter()
            .map(|f| (f64::from(dmin) + f * f64::from(span)).round() as i16)
            .collect();

        let bytes = EdfBuilder::new()
            .signal("Press.2s", "cmH2O", (pmin, pmax), (dmin, dmax), samples.len())
            .samples(&samples)
            .build();
        let mut reader = EdfReader::from_bytes(bytes).unwrap();
        let signal = reader.signal(0).unwrap().clone();
        let values = reader.get_physical_values(0).unwrap().as_physical().unwrap().to_vec();

        for (digital, physical) in samples.iter().zip(&values) {
            let expected = (f64::from(*digital) - f64::from(dmin))
                * (signal.physical_max - signal.physical_min)
                / f64::from(span)
                + signal.physical_min;
            prop_assert!((physical - expected).abs() <= 1e-9 * expected.abs().max(1.0));
        }
    }
}
