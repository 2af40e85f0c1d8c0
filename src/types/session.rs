//! Session boundaries and reconciled sessions.

use super::{DeviceFile, FileKind, GroupKey, SummaryRecord};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::collections::BTreeMap;

/// One mask-on to mask-off interval from the summary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionBoundary {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Slot index within the day's mask-on/mask-off channels.
    pub slot: usize,
}

impl SessionBoundary {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Closed-interval containment.
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Where a file group's time window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WindowSource {
    /// Start and duration read from the EDF header.
    Header,
    /// Start from the file name, no duration known.
    FileName,
    /// File modification time.
    Modified,
    /// Only the folder date is known.
    FolderDate,
}

/// Time span covered by a file group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub source: WindowSource,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, source: WindowSource) -> Self {
        Self { start, end: end.max(start), source }
    }

    /// Zero-length window at `instant`.
    pub fn instant(instant: NaiveDateTime, source: WindowSource) -> Self {
        Self { start: instant, end: instant, source }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Smallest window covering both.
    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        let source = if other.source == WindowSource::Header { other.source } else { self.source };
        TimeWindow { start: self.start.min(other.start), end: self.end.max(other.end), source }
    }
}

/// How a file group was attributed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    /// The group's window intersects the boundary for `overlap_secs` seconds.
    Overlap { boundary: usize, overlap_secs: i64 },
    /// No intersection; the boundary is the nearest one, `gap_secs` away.
    Nearest { boundary: usize, gap_secs: i64 },
    /// No boundary close enough. The group becomes its own session.
    Unmatched,
}

impl Disposition {
    pub fn boundary(&self) -> Option<usize> {
        match self {
            Disposition::Overlap { boundary, .. } | Disposition::Nearest { boundary, .. } => {
                Some(*boundary)
            }
            Disposition::Unmatched => None,
        }
    }
}

/// Record of one group folded into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub key: GroupKey,
    pub window: TimeWindow,
    pub disposition: Disposition,
}

/// One continuous therapy period.
///
/// Built once by the reconciler. Holds file identities only, never their
/// contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Position within the day, ordered by start.
    pub sequence: usize,
    pub files: BTreeMap<FileKind, Vec<DeviceFile>>,
    /// Matched summary boundary, `None` for unmatched sessions.
    pub boundary: Option<SessionBoundary>,
    pub attributions: Vec<Attribution>,
    /// Set when no summary boundary could be matched.
    pub unmatched: bool,
}

impl Session {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn files_of(&self, kind: FileKind) -> &[DeviceFile] {
        self.files.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// First file of a kind, in scan order.
    pub fn file(&self, kind: FileKind) -> Option<&DeviceFile> {
        self.files_of(kind).first()
    }

    pub fn all_files(&self) -> impl Iterator<Item = &DeviceFile> {
        self.files.values().flatten()
    }

    /// A session built from a summary boundary with no data files.
    pub fn is_summary_only(&self) -> bool {
        self.files.is_empty()
    }

    /// Owning summary record, looked up by date.
    pub fn summary_in<'a>(&self, records: &'a [SummaryRecord]) -> Option<&'a SummaryRecord> {
        records.iter().find(|record| record.date == self.date)
    }
}
