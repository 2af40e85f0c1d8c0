//! Files discovered under the card's `DATALOG` directory.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Kind of data a device file carries, from the type code in its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FileKind {
    /// High-rate breathing waveforms (flow, pressure).
    Brp,
    /// Low-rate therapy data (leak, minute ventilation, ...).
    Pld,
    /// Oximetry.
    Sad,
    /// Oximetry, alternate firmware naming.
    Sa2,
    /// Respiratory events (EDF+ annotations).
    Eve,
    /// Clinical summary, Cheyne-Stokes annotations.
    Csl,
    /// Additional events.
    Aev,
}

impl FileKind {
    pub const ALL: [FileKind; 7] = [
        FileKind::Brp,
        FileKind::Pld,
        FileKind::Sad,
        FileKind::Sa2,
        FileKind::Eve,
        FileKind::Csl,
        FileKind::Aev,
    ];

    /// Parse a type code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code().eq_ignore_ascii_case(code))
    }

    pub const fn code(&self) -> &'static str {
        match self {
            FileKind::Brp => "BRP",
            FileKind::Pld => "PLD",
            FileKind::Sad => "SAD",
            FileKind::Sa2 => "SA2",
            FileKind::Eve => "EVE",
            FileKind::Csl => "CSL",
            FileKind::Aev => "AEV",
        }
    }

    /// Whether files of this kind hold annotations rather than waveforms.
    pub const fn is_event_kind(&self) -> bool {
        matches!(self, FileKind::Eve | FileKind::Csl | FileKind::Aev)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Numbering embedded in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FileStamp {
    /// `YYYYMMDD_HHMMSS_TYPE.edf`
    Timestamp(NaiveDateTime),
    /// `TYPE0003.edf` or `TYPE_3.edf`
    Sequence(u32),
    /// `TYPE.edf`
    None,
}

/// One data file on the card. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceFile {
    pub path: PathBuf,
    /// Date of the `DATALOG/<YYYYMMDD>` folder holding the file.
    pub date: NaiveDate,
    pub kind: FileKind,
    pub stamp: FileStamp,
    /// Whether the name carries a `.gz` suffix.
    pub compressed: bool,
}

impl DeviceFile {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self.stamp {
            FileStamp::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<u32> {
        match self.stamp {
            FileStamp::Sequence(seq) => Some(seq),
            _ => None,
        }
    }
}

/// What the files of one group have in common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GroupKey {
    Timestamp(NaiveDateTime),
    Sequence(u32),
    /// Unnumbered files group by kind alone.
    Kind(FileKind),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Timestamp(ts) => write!(f, "{}", ts.format("%Y%m%d_%H%M%S")),
            GroupKey::Sequence(seq) => write!(f, "#{}", seq),
            GroupKey::Kind(kind) => write!(f, "{}", kind),
        }
    }
}

/// Files of one date folder recorded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub date: NaiveDate,
    pub key: GroupKey,
    /// Position of the group within its date folder.
    pub ordinal: usize,
    pub files: Vec<DeviceFile>,
}

impl FileGroup {
    pub fn file(&self, kind: FileKind) -> Option<&DeviceFile> {
        self.files.iter().find(|file| file.kind == kind)
    }
}
