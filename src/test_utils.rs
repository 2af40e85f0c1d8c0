//! Test utilities for building synthetic EDF files and SD-card trees
//!
//! Real card exports contain patient data and cannot be committed, so tests
//! and benchmarks generate byte-exact EDF files with [`EdfBuilder`], summary
//! files with [`SummaryBuilder`], and complete card layouts in a temporary
//! directory with [`CardBuilder`].

#![cfg(any(test, feature = "benchmark"))]

use crate::channels;
use crate::checksum::{crc16_ccitt, sibling_path};
use chrono::{NaiveDate, NaiveDateTime};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct SignalSpec {
    label: String,
    dimension: String,
    physical_min: String,
    physical_max: String,
    digital_min: i32,
    digital_max: i32,
    samples_per_record: usize,
    data: Option<Vec<i16>>,
}

/// Builder for byte-exact EDF files.
#[derive(Debug, Clone)]
pub struct EdfBuilder {
    version: String,
    patient: String,
    recording: String,
    date: String,
    time: String,
    reserved: String,
    record_duration: f64,
    records: usize,
    declared_records: Option<i64>,
    declared_signals: Option<i64>,
    signals: Vec<SignalSpec>,
}

impl Default for EdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "0".to_string(),
            patient: "X X X X".to_string(),
            recording: "Startdate 01-JAN-2024 SRN=00000000000".to_string(),
            date: "01.01.24".to_string(),
            time: "00.00.00".to_string(),
            reserved: String::new(),
            record_duration: 1.0,
            records: 1,
            declared_records: None,
            declared_signals: None,
            signals: Vec::new(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn recording(mut self, recording: &str) -> Self {
        self.recording = recording.to_string();
        self
    }

    /// Raw `dd.mm.yy` / `hh.mm.ss` start fields.
    pub fn start(mut self, date: &str, time: &str) -> Self {
        self.date = date.to_string();
        self.time = time.to_string();
        self
    }

    pub fn start_at(self, start: NaiveDateTime) -> Self {
        let date = start.format("%d.%m.%y").to_string();
        let time = start.format("%H.%M.%S").to_string();
        self.start(&date, &time)
    }

    pub fn reserved(mut self, reserved: &str) -> Self {
        self.reserved = reserved.to_string();
        self
    }

    pub fn record_duration(mut self, seconds: f64) -> Self {
        self.record_duration = seconds;
        self
    }

    pub fn records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// Override the record-count field (e.g. `-1`) without changing the data.
    pub fn declared_records(mut self, declared: i64) -> Self {
        self.declared_records = Some(declared);
        self
    }

    /// Override the signal-count field without changing the signal headers.
    pub fn declared_signals(mut self, declared: i64) -> Self {
        self.declared_signals = Some(declared);
        self
    }

    pub fn signal(
        self,
        label: &str,
        dimension: &str,
        physical: (f64, f64),
        digital: (i32, i32),
        samples_per_record: usize,
    ) -> Self {
        self.signal_raw(
            label,
            dimension,
            &physical.0.to_string(),
            &physical.1.to_string(),
            digital,
            samples_per_record,
        )
    }

    /// Add a signal with physical-range fields written verbatim.
    pub fn signal_raw(
        mut self,
        label: &str,
        dimension: &str,
        physical_min: &str,
        physical_max: &str,
        digital: (i32, i32),
        samples_per_record: usize,
    ) -> Self {
        self.signals.push(SignalSpec {
            label: label.to_string(),
            dimension: dimension.to_string(),
            physical_min: physical_min.to_string(),
            physical_max: physical_max.to_string(),
            digital_min: digital.0,
            digital_max: digital.1,
            samples_per_record,
            data: None,
        });
        self
    }

    /// Add an `EDF Annotations` signal holding one TAL byte string per record.
    pub fn annotations(mut self, samples_per_record: usize, per_record: &[&[u8]]) -> Self {
        let mut data = Vec::with_capacity(samples_per_record * per_record.len());
        for tal in per_record {
            let mut bytes = tal.to_vec();
            bytes.resize(samples_per_record * 2, 0);
            data.extend(bytes.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
        }
        self.signals.push(SignalSpec {
            label: "EDF Annotations".to_string(),
            dimension: String::new(),
            physical_min: "-1".to_string(),
            physical_max: "1".to_string(),
            digital_min: -32768,
            digital_max: 32767,
            samples_per_record,
            data: Some(data),
        });
        self
    }

    /// Set the digital samples of the most recently added signal.
    ///
    /// The buffer is cycled or truncated to `samples_per_record * records`.
    pub fn samples(mut self, data: &[i16]) -> Self {
        if let Some(signal) = self.signals.last_mut() {
            signal.data = Some(data.to_vec());
        }
        self
    }

    fn signal_data(&self, signal: &SignalSpec) -> Vec<i16> {
        let total = signal.samples_per_record * self.records;
        match &signal.data {
            Some(data) if !data.is_empty() => data.iter().copied().cycle().take(total).collect(),
            _ => {
                let span = i64::from(signal.digital_max) - i64::from(signal.digital_min);
                (0..total)
                    .map(|i| {
                        let offset = if span > 0 { i as i64 % (span + 1) } else { 0 };
                        (i64::from(signal.digital_min) + offset) as i16
                    })
                    .collect()
            }
        }
    }

    /// Serialize the file.
    pub fn build(&self) -> Vec<u8> {
        let count = self.signals.len();
        let header_bytes = 256 * (count + 1);
        let mut out = Vec::with_capacity(header_bytes);

        field(&mut out, &self.version, 8);
        field(&mut out, &self.patient, 80);
        field(&mut out, &self.recording, 80);
        field(&mut out, &self.date, 8);
        field(&mut out, &self.time, 8);
        field(&mut out, &header_bytes.to_string(), 8);
        field(&mut out, &self.reserved, 44);
        let records = self.declared_records.unwrap_or(self.records as i64);
        field(&mut out, &records.to_string(), 8);
        field(&mut out, &self.record_duration.to_string(), 8);
        let signals = self.declared_signals.unwrap_or(count as i64);
        field(&mut out, &signals.to_string(), 4);

        let columns: [(usize, fn(&SignalSpec) -> String); 10] = [
            (16, |s| s.label.clone()),
            (80, |_| String::new()),
            (8, |s| s.dimension.clone()),
            (8, |s| s.physical_min.clone()),
            (8, |s| s.physical_max.clone()),
            (8, |s| s.digital_min.to_string()),
            (8, |s| s.digital_max.to_string()),
            (80, |_| String::new()),
            (8, |s| s.samples_per_record.to_string()),
            (32, |_| String::new()),
        ];
        for (width, value) in columns {
            for signal in &self.signals {
                field(&mut out, &value(signal), width);
            }
        }

        let data: Vec<Vec<i16>> = self.signals.iter().map(|s| self.signal_data(s)).collect();
        for record in 0..self.records {
            for (signal, samples) in self.signals.iter().zip(&data) {
                let per = signal.samples_per_record;
                for sample in &samples[record * per..(record + 1) * per] {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
        out
    }

    pub fn build_gzip(&self) -> Vec<u8> {
        gzip(&self.build())
    }
}

fn field(out: &mut Vec<u8>, value: &str, width: usize) {
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(width, b' ');
    out.extend_from_slice(&bytes);
}

/// Gzip-compress a buffer.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("writing to a Vec cannot fail");
    encoder.finish().expect("finishing a Vec encoder cannot fail")
}

/// One day of a synthetic summary file.
#[derive(Debug, Clone, Default)]
pub struct SummaryDay {
    /// Mask-on / mask-off digital values per slot.
    pub pairs: Vec<(i16, i16)>,
    /// Digital values for aggregate channels, by label.
    pub statistics: Vec<(&'static str, i16)>,
}

impl SummaryDay {
    pub fn with_pairs(pairs: &[(i16, i16)]) -> Self {
        Self { pairs: pairs.to_vec(), statistics: Vec::new() }
    }

    pub fn stat(mut self, label: &'static str, digital: i16) -> Self {
        self.statistics.push((label, digital));
        self
    }
}

/// Aggregate channels written by [`SummaryBuilder`], in their native units with
/// physical = digital / 10.
pub const SUMMARY_AGGREGATES: [&str; 8] =
    ["AHI", "AI", "HI", "OAI", "CAI", "MaskPress.50", "Leak.50", "Duration"];

/// Builder for summary (`STR.edf`) files: one data record per day.
#[derive(Debug, Clone)]
pub struct SummaryBuilder {
    start: NaiveDate,
    slots: usize,
    minutes: bool,
    mask_labels: (&'static str, &'static str),
    leading_signals: usize,
    garbage_dimensions: bool,
    malformed_range: Option<&'static str>,
    days: Vec<SummaryDay>,
}

/// Digital value marking an empty mask-on/mask-off slot.
pub const EMPTY_SLOT: i16 = -1;

impl SummaryBuilder {
    pub fn new(start: NaiveDate) -> Self {
        Self {
            start,
            slots: 4,
            minutes: false,
            mask_labels: ("MaskOn", "MaskOff"),
            leading_signals: 0,
            garbage_dimensions: false,
            malformed_range: None,
            days: Vec::new(),
        }
    }

    pub fn slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    /// Mask times in minutes since midnight instead of seconds.
    pub fn minutes(mut self) -> Self {
        self.minutes = true;
        self
    }

    pub fn mask_labels(mut self, on: &'static str, off: &'static str) -> Self {
        self.mask_labels = (on, off);
        self
    }

    /// Insert uncatalogued signals before the mask channels.
    pub fn leading_signals(mut self, count: usize) -> Self {
        self.leading_signals = count;
        self
    }

    /// Write blank dimension fields for every signal.
    pub fn garbage_dimensions(mut self) -> Self {
        self.garbage_dimensions = true;
        self
    }

    /// Write unparseable physical-range fields for one aggregate label.
    pub fn malformed_range(mut self, label: &'static str) -> Self {
        self.malformed_range = Some(label);
        self
    }

    pub fn day(mut self, day: SummaryDay) -> Self {
        self.days.push(day);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let slots = self.slots;
        let (unit, max) = if self.minutes { ("min", 1440) } else { ("s", 32767) };
        let dimension = |unit: &'static str| if self.garbage_dimensions { "" } else { unit };

        let start = self.start.and_hms_opt(0, 0, 0).unwrap_or_default();
        let mut builder =
            EdfBuilder::new().start_at(start).record_duration(86_400.0).records(self.days.len());

        for i in 0..self.leading_signals {
            builder = builder
                .signal(&format!("Vendor.{}", i), "", (0.0, 1.0), (0, 1), 1)
                .samples(&[0]);
        }

        let slot_values = |pick: fn(&(i16, i16)) -> i16| -> Vec<i16> {
            self.days
                .iter()
                .flat_map(|day| {
                    let mut values: Vec<i16> = day.pairs.iter().map(pick).collect();
                    values.resize(slots, EMPTY_SLOT);
                    values
                })
                .collect()
        };
        let on = slot_values(|pair| pair.0);
        let off = slot_values(|pair| pair.1);

        builder = builder
            .signal(self.mask_labels.0, dimension(unit), (0.0, f64::from(max)), (0, max), slots)
            .samples(&on)
            .signal(self.mask_labels.1, dimension(unit), (0.0, f64::from(max)), (0, max), slots)
            .samples(&off);

        for label in SUMMARY_AGGREGATES {
            let values: Vec<i16> = self
                .days
                .iter()
                .map(|day| {
                    day.statistics
                        .iter()
                        .find(|(stat, _)| *stat == label)
                        .map_or(EMPTY_SLOT, |(_, value)| *value)
                })
                .collect();
            let unit = channels::lookup(label).map_or("", |spec| spec.native_unit);
            builder = if self.malformed_range == Some(label) {
                builder.signal_raw(label, dimension(unit), "garbage", "", (0, 1000), 1)
            } else {
                builder.signal(label, dimension(unit), (0.0, 100.0), (0, 1000), 1)
            };
            builder = builder.samples(&values);
        }

        builder.build()
    }
}

/// Temporary SD-card tree.
#[derive(Debug)]
pub struct CardBuilder {
    root: TempDir,
}

impl CardBuilder {
    pub fn new() -> io::Result<Self> {
        Ok(Self { root: TempDir::new()? })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn identification(&self, contents: &str) -> io::Result<PathBuf> {
        let path = self.root.path().join("Identification.tgt");
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn summary(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.root.path().join("STR.edf");
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn settings(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let dir = self.root.path().join("SETTINGS");
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write `DATALOG/<folder>/<name>`.
    pub fn datalog_file(&self, folder: &str, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir = self.root.path().join("DATALOG").join(folder);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Write a matching CRC-16 sibling for a file already on the card.
    pub fn with_crc(&self, path: &Path) -> io::Result<PathBuf> {
        let data = fs::read(path)?;
        let sibling = sibling_path(path);
        fs::write(&sibling, crc16_ccitt(&data).to_le_bytes())?;
        Ok(sibling)
    }
}

/// `NaiveDateTime` from components, for test tables.
pub fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, s))
        .expect("valid test timestamp")
}
