//! Reader configuration.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```yaml
//! crc_mode: strict          # strict | permissive | disabled
//! probe_headers: true       # read EDF headers to time file groups
//! merge_tolerance_secs: 900
//! datalog_dir: DATALOG
//! summary_file: STR.edf
//! settings_dir: SETTINGS
//! ```

use crate::checksum::{ChecksumVerifier, CrcMode};
use crate::reconcile::{DEFAULT_MERGE_TOLERANCE_SECS, ReconcilePolicy};
use crate::{CpapError, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    pub crc_mode: CrcMode,
    /// Read each group's EDF header for its start and duration. When off,
    /// windows come from file names, modification times or folder dates.
    pub probe_headers: bool,
    pub merge_tolerance_secs: u32,
    pub datalog_dir: String,
    pub summary_file: String,
    pub settings_dir: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            crc_mode: CrcMode::default(),
            probe_headers: true,
            merge_tolerance_secs: DEFAULT_MERGE_TOLERANCE_SECS as u32,
            datalog_dir: "DATALOG".to_string(),
            summary_file: "STR.edf".to_string(),
            settings_dir: "SETTINGS".to_string(),
        }
    }
}

impl ReaderConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            CpapError::config_error(format!("invalid reader configuration: {}", e), Some(Box::new(e)))
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| CpapError::file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), ?config, "Loaded reader configuration");
        Ok(config)
    }

    pub fn verifier(&self) -> ChecksumVerifier {
        ChecksumVerifier::new(self.crc_mode)
    }

    pub fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::new(TimeDelta::seconds(i64::from(self.merge_tolerance_secs)))
    }
}
