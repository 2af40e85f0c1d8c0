//! Checksum sibling verification.
//!
//! Every data file on the card may have a sibling `.crc` record written by
//! the device. The sibling is found by stripping a trailing `.gz` from the
//! data file name and replacing its extension with `.crc`. A 2-byte record
//! holds a little-endian CRC-16/CCITT-FALSE, a 4-byte record a little-endian
//! CRC-32 (IEEE) or a zero-extended CRC-16. Checksums always cover the file
//! bytes as stored, before any decompression.

use crate::{CpapError, Result};
use flate2::Crc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

/// How strictly sibling checksums are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrcMode {
    /// A missing or mismatched checksum fails the file's parse.
    Strict,
    /// Mismatches are reported through [`CrcStatus`]; parsing proceeds.
    #[default]
    Permissive,
    /// Sibling files are never opened.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CrcAlgorithm {
    Crc16,
    Crc32,
}

impl fmt::Display for CrcAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcAlgorithm::Crc16 => write!(f, "CRC-16/CCITT-FALSE"),
            CrcAlgorithm::Crc32 => write!(f, "CRC-32"),
        }
    }
}

/// Per-file checksum outcome. Never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrcStatus {
    Verified {
        algorithm: CrcAlgorithm,
    },
    /// The sibling exists but does not match. `expected` is `None` when the
    /// sibling has an unrecognized length.
    Mismatched {
        expected: Option<u32>,
        crc16: u16,
        crc32: u32,
    },
    Absent,
    Skipped,
}

impl CrcStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, CrcStatus::Verified { .. })
    }

    pub fn is_mismatched(&self) -> bool {
        matches!(self, CrcStatus::Mismatched { .. })
    }
}

impl fmt::Display for CrcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcStatus::Verified { algorithm } => write!(f, "verified ({})", algorithm),
            CrcStatus::Mismatched { expected: Some(expected), crc16, crc32 } => write!(
                f,
                "mismatched (expected {:#x}, computed crc16 {:#06x} / crc32 {:#010x})",
                expected, crc16, crc32
            ),
            CrcStatus::Mismatched { expected: None, .. } => {
                write!(f, "mismatched (unrecognized checksum record)")
            }
            CrcStatus::Absent => write!(f, "absent"),
            CrcStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no reflection.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ CRC16_POLY } else { crc << 1 };
        }
        crc
    })
}

/// CRC-32 (IEEE 802.3).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

/// Location of the checksum sibling for `path`.
///
/// `20240101_120000_BRP.edf.gz` maps to `20240101_120000_BRP.crc`.
pub fn sibling_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    path.with_file_name(format!("{}.crc", stem))
}

/// Compare a sibling record against the data it covers.
pub fn check_record(record: &[u8], data: &[u8]) -> CrcStatus {
    let crc16 = crc16_ccitt(data);
    let crc32 = crc32(data);

    let expected = match *record {
        [a, b] => u32::from(u16::from_le_bytes([a, b])),
        [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
        _ => return CrcStatus::Mismatched { expected: None, crc16, crc32 },
    };

    if record.len() == 4 && expected == crc32 {
        CrcStatus::Verified { algorithm: CrcAlgorithm::Crc32 }
    } else if expected == u32::from(crc16) {
        CrcStatus::Verified { algorithm: CrcAlgorithm::Crc16 }
    } else {
        CrcStatus::Mismatched { expected: Some(expected), crc16, crc32 }
    }
}

/// Applies a [`CrcMode`] to data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumVerifier {
    mode: CrcMode,
}

impl ChecksumVerifier {
    pub fn new(mode: CrcMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> CrcMode {
        self.mode
    }

    /// Read `path` and verify it against its sibling.
    pub fn verify(&self, path: &Path) -> Result<CrcStatus> {
        if self.mode == CrcMode::Disabled {
            return Ok(CrcStatus::Skipped);
        }
        let data = fs::read(path).map_err(|e| CpapError::file_error(path.to_path_buf(), e))?;
        self.verify_bytes(path, &data)
    }

    /// Verify bytes already read from `path` (as stored, still compressed if `.gz`).
    ///
    /// In strict mode an absent or mismatched checksum is a
    /// [`CpapError::Checksum`]; otherwise the status is returned.
    pub fn verify_bytes(&self, path: &Path, data: &[u8]) -> Result<CrcStatus> {
        if self.mode == CrcMode::Disabled {
            return Ok(CrcStatus::Skipped);
        }

        let sibling = sibling_path(path);
        let status = match fs::read(&sibling) {
            Ok(record) => check_record(&record, data),
            Err(e) if e.kind() == ErrorKind::NotFound => CrcStatus::Absent,
            Err(e) => return Err(CpapError::file_error(sibling, e)),
        };

        match status {
            CrcStatus::Verified { algorithm } => {
                debug!(path = %path.display(), %algorithm, "Checksum verified");
            }
            CrcStatus::Mismatched { .. } => {
                warn!(path = %path.display(), %status, "Checksum mismatch");
            }
            CrcStatus::Absent => {
                debug!(path = %path.display(), sibling = %sibling.display(), "No checksum sibling");
            }
            CrcStatus::Skipped => {}
        }

        if self.mode == CrcMode::Strict && !status.is_verified() {
            return Err(CpapError::checksum_failed(path.to_path_buf(), status.to_string()));
        }
        Ok(status)
    }

    /// Verify every data file under `dir`, descending into subfolders.
    ///
    /// Per-file failures (strict-mode rejections, unreadable files) are kept
    /// alongside the path instead of aborting the walk.
    pub fn verify_directory(&self, dir: &Path) -> Result<Vec<(PathBuf, Result<CrcStatus>)>> {
        let mut results = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                CpapError::file_error(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("crc")) {
                continue;
            }
            let status = self.verify(&path);
            results.push((path, status));
        }
        debug!(dir = %dir.display(), files = results.len(), "Verified directory");
        Ok(results)
    }
}
