//! `DATALOG` directory scanning
//!
//! Data files live in one folder per day, `DATALOG/<YYYYMMDD>/`. Three naming
//! schemes occur across firmware revisions:
//!
//! | Name                          | Stamp                   |
//! |-------------------------------|-------------------------|
//! | `20240101_223015_BRP.edf[.gz]` | [`FileStamp::Timestamp`] |
//! | `BRP0003.edf`, `BRP_3.edf`    | [`FileStamp::Sequence`]  |
//! | `BRP.edf`                     | [`FileStamp::None`]      |
//!
//! Files sharing a timestamp or sequence number within a folder were
//! recorded together and form one [`FileGroup`]. Unnumbered files group by
//! kind. Checksum siblings are not data files and are passed over silently;
//! anything else unrecognised is reported in [`ScanReport::skipped`].

use crate::types::{DeviceFile, FileGroup, FileKind, FileStamp, GroupKey};
use crate::{CpapError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Why an entry under `DATALOG` was not scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// A directory whose name is not a `YYYYMMDD` date.
    NotADateFolder,
    /// A file directly under `DATALOG` instead of a date folder.
    OutsideDateFolder,
    /// A name matching none of the data-file grammars.
    UnrecognizedName,
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotADateFolder => write!(f, "not a date folder"),
            SkipReason::OutsideDateFolder => write!(f, "outside any date folder"),
            SkipReason::UnrecognizedName => write!(f, "unrecognized file name"),
            SkipReason::Unreadable(details) => write!(f, "unreadable: {}", details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Groups ordered by folder date, then key.
    pub groups: Vec<FileGroup>,
    pub skipped: Vec<SkippedEntry>,
}

impl ScanReport {
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|group| group.files.len()).sum()
    }

    /// Every data file of one folder date.
    pub fn files_on(&self, date: NaiveDate) -> impl Iterator<Item = &DeviceFile> {
        self.groups.iter().filter(move |group| group.date == date).flat_map(|group| &group.files)
    }
}

/// Components parsed from a data-file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub kind: FileKind,
    pub stamp: FileStamp,
    pub compressed: bool,
}

/// Parse a data-file name against the three grammars.
pub fn parse_file_name(name: &str) -> Option<ParsedName> {
    let (stem, compressed) = match strip_suffix_ignore_case(name, ".edf.gz") {
        Some(stem) => (stem, true),
        None => (strip_suffix_ignore_case(name, ".edf")?, false),
    };

    if let Some(parsed) = parse_timestamped(stem) {
        return Some(ParsedName { kind: parsed.0, stamp: FileStamp::Timestamp(parsed.1), compressed });
    }

    if let Some(kind) = FileKind::from_code(stem) {
        return Some(ParsedName { kind, stamp: FileStamp::None, compressed });
    }

    // Type codes may contain digits (SA2), so match the code as a prefix.
    FileKind::ALL.into_iter().find_map(|kind| {
        let code = kind.code();
        let prefix = stem.get(..code.len())?;
        if !prefix.eq_ignore_ascii_case(code) {
            return None;
        }
        let digits = &stem[code.len()..];
        let digits = digits.strip_prefix('_').unwrap_or(digits);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence = digits.parse().ok()?;
        Some(ParsedName { kind, stamp: FileStamp::Sequence(sequence), compressed })
    })
}

fn parse_timestamped(stem: &str) -> Option<(FileKind, NaiveDateTime)> {
    let mut parts = stem.splitn(3, '_');
    let (date, time, code) = (parts.next()?, parts.next()?, parts.next()?);
    if date.len() != 8 || time.len() != 6 {
        return None;
    }
    let kind = FileKind::from_code(code)?;
    let timestamp =
        NaiveDateTime::parse_from_str(&format!("{}{}", date, time), "%Y%m%d%H%M%S").ok()?;
    Some((kind, timestamp))
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) || !name[split..].eq_ignore_ascii_case(suffix) {
        return None;
    }
    Some(&name[..split])
}

/// Parse a `YYYYMMDD` folder name.
pub fn parse_folder_date(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y%m%d").ok()
}

fn is_checksum_sibling(name: &str) -> bool {
    strip_suffix_ignore_case(name, ".crc").is_some()
}

/// Scan a `DATALOG` directory.
///
/// Fails only if `datalog` itself cannot be read; every problem below it is
/// recorded in the report.
pub fn scan<P: AsRef<Path>>(datalog: P) -> Result<ScanReport> {
    let datalog = datalog.as_ref();
    let metadata =
        fs::metadata(datalog).map_err(|e| CpapError::file_error(datalog.to_path_buf(), e))?;
    if !metadata.is_dir() {
        return Err(CpapError::file_error(
            datalog.to_path_buf(),
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "DATALOG is not a directory"),
        ));
    }

    let mut report = ScanReport::default();
    let mut folders: BTreeMap<NaiveDate, BTreeMap<GroupKey, Vec<DeviceFile>>> = BTreeMap::new();
    let mut current: Option<NaiveDate> = None;

    let mut walker = WalkDir::new(datalog).min_depth(1).max_depth(2).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map_or_else(|| datalog.to_path_buf(), Path::to_path_buf);
                report.skipped.push(SkippedEntry { path, reason: SkipReason::Unreadable(e.to_string()) });
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy();
        let is_dir = entry.file_type().is_dir();

        if entry.depth() == 1 {
            if !is_dir {
                report.skipped.push(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: SkipReason::OutsideDateFolder,
                });
                continue;
            }
            current = parse_folder_date(&name);
            if current.is_none() {
                trace!(path = %entry.path().display(), "Skipping non-date folder");
                report.skipped.push(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: SkipReason::NotADateFolder,
                });
                walker.skip_current_dir();
            }
            continue;
        }

        let Some(date) = current else { continue };
        if !is_dir && is_checksum_sibling(&name) {
            continue;
        }
        let parsed = if is_dir { None } else { parse_file_name(&name) };
        let Some(parsed) = parsed else {
            report.skipped.push(SkippedEntry {
                path: entry.path().to_path_buf(),
                reason: SkipReason::UnrecognizedName,
            });
            continue;
        };

        let key = match parsed.stamp {
            FileStamp::Timestamp(ts) => GroupKey::Timestamp(ts),
            FileStamp::Sequence(seq) => GroupKey::Sequence(seq),
            FileStamp::None => GroupKey::Kind(parsed.kind),
        };
        trace!(file = %name, %key, kind = %parsed.kind, "Discovered data file");
        folders.entry(date).or_default().entry(key).or_default().push(DeviceFile {
            path: entry.path().to_path_buf(),
            date,
            kind: parsed.kind,
            stamp: parsed.stamp,
            compressed: parsed.compressed,
        });
    }

    for (date, groups) in folders {
        for (ordinal, (key, mut files)) in groups.into_iter().enumerate() {
            files.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)));
            report.groups.push(FileGroup { date, key, ordinal, files });
        }
    }

    debug!(
        path = %datalog.display(),
        groups = report.groups.len(),
        files = report.file_count(),
        skipped = report.skipped.len(),
        "Scanned DATALOG"
    );
    Ok(report)
}
