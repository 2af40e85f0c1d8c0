//! End-to-end reading of a card written to disk through the public API.

use anyhow::{Context, Result, ensure};
use cpap_sd::{CrcMode, FileKind, ReaderConfig, SdCard, WindowSource};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// (label, dimension, physical range, digital range, samples)
type Signal<'a> = (&'a str, &'a str, (f64, f64), (i16, i16), &'a [i16]);

/// Single-record EDF file.
fn edf(date: &str, time: &str, duration: f64, signals: &[Signal<'_>]) -> Vec<u8> {
    fn put(out: &mut Vec<u8>, value: &str, width: usize) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, b' ');
        out.extend_from_slice(&bytes);
    }

    let mut out = Vec::new();
    put(&mut out, "0", 8);
    put(&mut out, "", 80);
    put(&mut out, "SRN=23192565432", 80);
    put(&mut out, date, 8);
    put(&mut out, time, 8);
    put(&mut out, &(256 * (signals.len() + 1)).to_string(), 8);
    put(&mut out, "", 44);
    put(&mut out, "1", 8);
    put(&mut out, &duration.to_string(), 8);
    put(&mut out, &signals.len().to_string(), 4);

    let columns: [(usize, fn(&Signal<'_>) -> String); 10] = [
        (16, |s| s.0.to_string()),
        (80, |_| String::new()),
        (8, |s| s.1.to_string()),
        (8, |s| s.2.0.to_string()),
        (8, |s| s.2.1.to_string()),
        (8, |s| s.3.0.to_string()),
        (8, |s| s.3.1.to_string()),
        (80, |_| String::new()),
        (8, |s| s.4.len().to_string()),
        (32, |_| String::new()),
    ];
    for (width, value) in columns {
        for signal in signals {
            put(&mut out, &value(signal), width);
        }
    }
    for signal in signals {
        for sample in signal.4 {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// Summary with one session 23:00-23:50 on 2024-03-01 and two data groups.
fn write_card(root: &Path) -> Result<()> {
    let summary = edf(
        "01.03.24",
        "00.00.00",
        86_400.0,
        &[
            ("MaskOn", "min", (0.0, 1440.0), (0, 1440), &[1380, -1]),
            ("MaskOff", "min", (0.0, 1440.0), (0, 1440), &[1430, -1]),
            ("AHI", "", (0.0, 100.0), (0, 1000), &[42]),
        ],
    );
    write(&root.join("STR.edf"), &summary)?;
    write(&root.join("Identification.tgt"), b"#SRN 23192565432\n")?;

    let pld = edf(
        "01.03.24",
        "23.00.05",
        2_940.0,
        &[("Press.2s", "cmH2O", (0.0, 20.0), (0, 2000), &[800, 820, 840])],
    );
    write(&root.join("DATALOG/20240301/20240301_230005_PLD.edf"), &pld)?;
    write(&root.join("DATALOG/20240301/20240301_230005_EVE.edf"), &edf(
        "01.03.24",
        "23.00.05",
        60.0,
        &[("EDF Annotations", "", (-1.0, 1.0), (-32768, 32767), &[0; 8])],
    ))?;

    let stray = edf(
        "02.03.24",
        "14.00.00",
        60.0,
        &[("Press.2s", "cmH2O", (0.0, 20.0), (0, 2000), &[1000])],
    );
    write(&root.join("DATALOG/20240302/20240302_140000_PLD.edf"), &stray)?;
    Ok(())
}

#[test]
fn reads_a_card_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    write_card(dir.path())?;

    let card = SdCard::open(dir.path())?;
    ensure!(card.issues().is_empty(), "unexpected issues: {:?}", card.issues());

    let summary = card.summary().context("summary parsed")?;
    assert_eq!(summary.records().len(), 1);
    assert_eq!(summary.records()[0].statistics.ahi, Some(4.2));

    let sessions = card.sessions();
    assert_eq!(sessions.len(), 2);

    let night = &sessions[0];
    assert!(!night.unmatched);
    assert_eq!(night.start.format("%H:%M").to_string(), "23:00");
    assert_eq!(night.end.format("%H:%M").to_string(), "23:50");
    assert_eq!(night.attributions.len(), 1);
    assert_eq!(night.attributions[0].window.source, WindowSource::Header);
    assert!(night.file(FileKind::Eve).is_some());

    let mut reader = card.load_file(night.file(FileKind::Pld).context("PLD file")?)?;
    let pressure = reader.canonical_values(0)?.context("pressure decodes")?;
    assert_eq!(pressure, vec![8.0, 8.2, 8.4]);

    let stray = &sessions[1];
    assert!(stray.unmatched);
    assert_eq!(stray.date.to_string(), "2024-03-02");
    assert_eq!(stray.sequence, 0);
    Ok(())
}

#[test]
fn configuration_changes_layout_and_checksum_policy() -> Result<()> {
    let dir = TempDir::new()?;
    write_card(dir.path())?;
    fs::rename(dir.path().join("STR.edf"), dir.path().join("SUMMARY.edf"))?;

    let config_path = dir.path().join("reader.yaml");
    fs::write(&config_path, "summary_file: SUMMARY.edf\ncrc_mode: disabled\nprobe_headers: false\n")?;
    let config = ReaderConfig::from_yaml_file(&config_path)?;
    assert_eq!(config.crc_mode, CrcMode::Disabled);

    let card = SdCard::open_with(dir.path(), config)?;
    assert!(card.summary().is_some());
    assert_eq!(card.sessions()[0].attributions[0].window.source, WindowSource::FileName);
    for (_, status) in card.verify_session(&card.sessions()[0]) {
        assert!(status.is_ok());
    }
    Ok(())
}
