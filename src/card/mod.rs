//! SD-card facade
//!
//! [`SdCard`] ties the pieces together: it parses the summary file, scans
//! `DATALOG`, works out a time window for every file group and reconciles the
//! groups against the summary's session boundaries. Problems that only affect
//! part of the card are collected as [`CardIssue`]s instead of failing the
//! open.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cpap_sd::{FileKind, SdCard};
//!
//! fn list_sessions() -> cpap_sd::Result<()> {
//!     let card = SdCard::open("/media/SDCARD")?;
//!     for issue in card.issues() {
//!         eprintln!("warning: {}", issue);
//!     }
//!
//!     for session in card.sessions() {
//!         let ahi = card.summary_for(session).and_then(|day| day.statistics.ahi);
//!         println!(
//!             "{} #{}: {} -> {} ({} files, AHI {:?})",
//!             session.date,
//!             session.sequence,
//!             session.start,
//!             session.end,
//!             session.all_files().count(),
//!             ahi
//!         );
//!
//!         if let Some(file) = session.file(FileKind::Brp) {
//!             let mut reader = card.load_file(file)?;
//!             println!("  {} signals", reader.parse_signal_headers()?.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Time windows
//!
//! A group's window is taken from the first source that yields one:
//!
//! 1. the EDF headers of its files (start plus record count times duration),
//!    when `probe_headers` is set
//! 2. the timestamp embedded in the file names
//! 3. the modification time of its files
//! 4. noon of its folder date

use crate::checksum::CrcStatus;
use crate::config::ReaderConfig;
use crate::edf::{Annotation, EdfReader, StandardDialect, peek_header};
use crate::reconcile::{self, Candidate};
use crate::scanner::{self, ScanReport, SkippedEntry};
use crate::summary::SummaryFile;
use crate::types::{
    DeviceFile, FileGroup, GroupKey, Session, SummaryRecord, TimeWindow, WindowSource,
};
use crate::{CpapError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A problem that left part of the card unread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CardIssue {
    SummaryMissing { path: PathBuf },
    SummaryUnreadable { path: PathBuf, error: String },
    DatalogUnreadable { path: PathBuf, error: String },
    /// An entry under `DATALOG` the scanner passed over.
    Skipped(SkippedEntry),
    /// A data file's header could not be read while timing its group.
    HeaderProbeFailed { path: PathBuf, error: String },
}

impl fmt::Display for CardIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardIssue::SummaryMissing { path } => {
                write!(f, "summary file {} not found", path.display())
            }
            CardIssue::SummaryUnreadable { path, error } => {
                write!(f, "summary file {} unreadable: {}", path.display(), error)
            }
            CardIssue::DatalogUnreadable { path, error } => {
                write!(f, "data directory {} unreadable: {}", path.display(), error)
            }
            CardIssue::Skipped(entry) => {
                write!(f, "skipped {}: {}", entry.path.display(), entry.reason)
            }
            CardIssue::HeaderProbeFailed { path, error } => {
                write!(f, "header of {} unreadable: {}", path.display(), error)
            }
        }
    }
}

/// An opened SD card.
#[derive(Debug, Clone)]
pub struct SdCard {
    root: PathBuf,
    config: ReaderConfig,
    summary: Option<SummaryFile>,
    scan: ScanReport,
    sessions: Vec<Session>,
    identification: Option<PathBuf>,
    settings: Vec<PathBuf>,
    issues: Vec<CardIssue>,
}

impl SdCard {
    /// Open a card with the default configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open_with(root, ReaderConfig::default())
    }

    /// Open a card.
    ///
    /// Fails only if `root` is not a readable directory.
    pub fn open_with<P: AsRef<Path>>(root: P, config: ReaderConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let entries = list_files(&root).map_err(|e| CpapError::file_error(root.clone(), e))?;
        info!(root = %root.display(), "Opening SD card");

        let mut issues = Vec::new();
        let identification = entries
            .iter()
            .find(|path| {
                path.file_stem().is_some_and(|stem| stem.eq_ignore_ascii_case("identification"))
                    && !has_extension(path, "crc")
            })
            .cloned();
        let settings: Vec<PathBuf> = list_files(&root.join(&config.settings_dir))
            .map(|paths| paths.into_iter().filter(|path| !has_extension(path, "crc")).collect())
            .unwrap_or_default();

        let summary = load_summary(&root.join(&config.summary_file), &config, &mut issues);

        let datalog = root.join(&config.datalog_dir);
        let scan = match scanner::scan(&datalog) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %datalog.display(), error = %e, "DATALOG unreadable");
                issues.push(CardIssue::DatalogUnreadable { path: datalog, error: e.to_string() });
                ScanReport::default()
            }
        };
        issues.extend(scan.skipped.iter().cloned().map(CardIssue::Skipped));

        let candidates: Vec<Candidate> = scan
            .groups
            .iter()
            .map(|group| Candidate {
                group: group.clone(),
                window: resolve_window(group, config.probe_headers, &mut issues),
            })
            .collect();

        let boundaries: Vec<_> =
            summary.iter().flat_map(|summary| summary.boundaries().copied()).collect();
        let sessions = reconcile::reconcile(&boundaries, candidates, &config.policy());

        debug!(
            root = %root.display(),
            sessions = sessions.len(),
            issues = issues.len(),
            "Opened SD card"
        );

        Ok(Self { root, config, summary, scan, sessions, identification, settings, issues })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Reconciled sessions, ordered by start.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn sessions_on(&self, date: NaiveDate) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(move |session| session.date == date)
    }

    /// Sessions dated within `first..=last`, ordered by start.
    pub fn sessions_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(move |session| (first..=last).contains(&session.date))
    }

    /// Parsed summary file, `None` if it was missing or unreadable.
    pub fn summary(&self) -> Option<&SummaryFile> {
        self.summary.as_ref()
    }

    /// Summary record of the session's day.
    pub fn summary_for(&self, session: &Session) -> Option<&SummaryRecord> {
        session.summary_in(self.summary.as_ref()?.records())
    }

    /// Open one data file for lazy parsing, applying the checksum policy.
    pub fn load_file(&self, file: &DeviceFile) -> Result<EdfReader> {
        EdfReader::open_with(&file.path, StandardDialect, &self.config.verifier())
    }

    /// Annotations from every event file of a session, in onset order.
    pub fn session_events(&self, session: &Session) -> Result<Vec<(NaiveDateTime, Annotation)>> {
        let mut events = Vec::new();
        for file in session.all_files().filter(|file| file.kind.is_event_kind()) {
            let mut reader = self.load_file(file)?;
            let start = reader.parse_header()?.start;
            for annotation in reader.annotations()? {
                match annotation.at(start) {
                    Some(at) => events.push((at, annotation)),
                    None => warn!(
                        path = %file.path.display(),
                        onset = annotation.onset,
                        "Dropping annotation with out-of-range onset"
                    ),
                }
            }
        }
        events.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(events)
    }

    /// Checksum status of every data file of a session.
    pub fn verify_session(&self, session: &Session) -> Vec<(PathBuf, Result<CrcStatus>)> {
        let verifier = self.config.verifier();
        session.all_files().map(|file| (file.path.clone(), verifier.verify(&file.path))).collect()
    }

    pub fn identification_path(&self) -> Option<&Path> {
        self.identification.as_deref()
    }

    pub fn settings_paths(&self) -> &[PathBuf] {
        &self.settings
    }

    pub fn issues(&self) -> &[CardIssue] {
        &self.issues
    }

    pub fn scan(&self) -> &ScanReport {
        &self.scan
    }
}

fn load_summary(
    path: &Path,
    config: &ReaderConfig,
    issues: &mut Vec<CardIssue>,
) -> Option<SummaryFile> {
    if !path.is_file() {
        warn!(path = %path.display(), "Summary file missing");
        issues.push(CardIssue::SummaryMissing { path: path.to_path_buf() });
        return None;
    }
    match SummaryFile::open_with(path, &config.verifier()) {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Summary file unreadable");
            issues.push(CardIssue::SummaryUnreadable {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
            None
        }
    }
}

/// Window covered by a group, from the best available source.
fn resolve_window(group: &FileGroup, probe: bool, issues: &mut Vec<CardIssue>) -> TimeWindow {
    if probe {
        let mut probed: Option<TimeWindow> = None;
        for file in &group.files {
            match peek_header(&file.path) {
                Ok(header) => {
                    let end = header.end().unwrap_or(header.start);
                    let window = TimeWindow::new(header.start, end, WindowSource::Header);
                    probed = Some(probed.map_or(window, |so_far| so_far.union(&window)));
                }
                Err(e) => {
                    debug!(path = %file.path.display(), error = %e, "Header probe failed");
                    issues.push(CardIssue::HeaderProbeFailed {
                        path: file.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        if let Some(window) = probed {
            return window;
        }
    }

    if let GroupKey::Timestamp(ts) = group.key {
        return TimeWindow::instant(ts, WindowSource::FileName);
    }

    let modified = group
        .files
        .iter()
        .filter_map(|file| fs::metadata(&file.path).and_then(|meta| meta.modified()).ok())
        .map(|time| DateTime::<Local>::from(time).naive_local())
        .min();
    if let Some(modified) = modified {
        return TimeWindow::instant(modified, WindowSource::Modified);
    }

    let noon = group.date.and_time(NaiveTime::MIN) + TimeDelta::hours(12);
    TimeWindow::instant(noon, WindowSource::FolderDate)
}

/// Regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
