//! Error types for SD-card parsing.
//!
//! Every failure the crate can report is a variant of [`CpapError`]. Only
//! structural corruption of a single file is fatal, and only to that file's
//! parse; callers walking an entire card should log the error and continue
//! with the next file.
//!
//! ## Error Categories
//!
//! - **File Errors**: the file could not be opened or read
//! - **Structure Errors**: the buffer is shorter than the structure it declares
//!   ([`CpapError::TruncatedField`], [`CpapError::OutOfBounds`])
//! - **Header Errors**: unrecognized version tag or invalid counts
//! - **Checksum Errors**: only raised in strict checksum mode
//! - **Channel Errors**: a label absent from the channel catalog (never fatal,
//!   callers fall back to the raw label)
//!
//! ## Helper Constructors
//!
//! ```rust
//! use cpap_sd::CpapError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
//! let file_error = CpapError::file_error(PathBuf::from("/card/STR.edf"), io_err);
//! assert!(file_error.is_fatal_to_file());
//!
//! let header_error = CpapError::header_parse("Header validation", "signal count is zero");
//! assert!(header_error.to_string().contains("signal count is zero"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SD-card operations.
pub type Result<T, E = CpapError> = std::result::Result<T, E>;

/// Main error type for SD-card operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CpapError {
    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Truncated field '{field}' at offset {offset}: need {width} bytes, {available} available"
    )]
    TruncatedField { field: String, offset: usize, width: usize, available: usize },

    #[error("Read of {requested} bytes at offset {offset:#x} exceeds buffer length {len}")]
    OutOfBounds { offset: usize, requested: usize, len: usize },

    #[error("Header parse error in {context}: {details}")]
    HeaderParse { context: String, details: String },

    #[error("Checksum verification failed for {path}: {details}")]
    Checksum { path: PathBuf, details: String },

    #[error("Channel '{label}' is not in the channel catalog")]
    UnknownChannel { label: String },

    #[error("Failed to decompress gzip stream")]
    Decompress {
        #[source]
        source: std::io::Error,
    },

    #[error("Signal index {index} out of range (file has {count} signals)")]
    SignalIndex { index: usize, count: usize },

    #[error("Configuration error: {details}")]
    Config {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CpapError {
    /// Returns whether this error aborts the parse of the file it concerns.
    ///
    /// Channel lookups never abort a parse; the reader substitutes a raw-label
    /// passthrough signal instead.
    pub fn is_fatal_to_file(&self) -> bool {
        match self {
            CpapError::File { .. } => true,
            CpapError::TruncatedField { .. } => true,
            CpapError::OutOfBounds { .. } => true,
            CpapError::HeaderParse { .. } => true,
            CpapError::Checksum { .. } => true,
            CpapError::Decompress { .. } => true,
            CpapError::UnknownChannel { .. } => false,
            CpapError::SignalIndex { .. } => false,
            CpapError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CpapError::File { .. } => vec![
                "Check the SD card is mounted and readable",
                "Verify the path points at the card root",
                "Check file permissions",
            ],
            CpapError::TruncatedField { .. } | CpapError::OutOfBounds { .. } => vec![
                "Re-copy the file from the SD card",
                "Check the card was ejected cleanly by the device",
                "Skip this file and continue with the rest of the card",
            ],
            CpapError::HeaderParse { .. } => vec![
                "Verify the file is an EDF export from a supported device",
                "Skip this file and continue with the rest of the card",
            ],
            CpapError::Checksum { .. } => vec![
                "Re-copy the file and its .crc sibling from the SD card",
                "Use permissive checksum mode to inspect the data anyway",
            ],
            CpapError::UnknownChannel { .. } => vec![
                "Use the raw signal label to access the data",
                "Add a catalog entry for the new firmware label",
            ],
            CpapError::Decompress { .. } => vec![
                "Check the .gz file is complete",
                "Decompress the file manually to inspect it",
            ],
            CpapError::SignalIndex { .. } => vec![
                "Look signals up by label or channel id",
                "Check the signal count in the file header",
            ],
            CpapError::Config { .. } => vec![
                "Check the configuration YAML syntax",
                "Remove unknown configuration keys",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        CpapError::File { path, source }
    }

    /// Helper constructor for header parse errors.
    pub fn header_parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        CpapError::HeaderParse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for truncated fixed-width fields.
    pub fn truncated_field(
        field: impl Into<String>,
        offset: usize,
        width: usize,
        available: usize,
    ) -> Self {
        CpapError::TruncatedField { field: field.into(), offset, width, available }
    }

    /// Helper constructor for strict-mode checksum failures.
    pub fn checksum_failed(path: PathBuf, details: impl Into<String>) -> Self {
        CpapError::Checksum { path, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(
        details: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        CpapError::Config { details: details.into(), source }
    }
}

impl From<std::io::Error> for CpapError {
    fn from(err: std::io::Error) -> Self {
        CpapError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_their_context(
                field in "[a-z_]{1,16}",
                offset in 0usize..0x10000usize,
                width in 1usize..128usize,
                label in "[A-Za-z0-9.]{1,16}",
                details in ".*"
            ) {
                let truncated = CpapError::truncated_field(field.clone(), offset, width, width - 1);
                prop_assert!(truncated.to_string().contains(&field));
                prop_assert!(truncated.to_string().contains(&width.to_string()));

                let bounds = CpapError::OutOfBounds { offset, requested: width, len: offset };
                let hex_offset = format!("{:#x}", offset);
                prop_assert!(bounds.to_string().contains(&hex_offset));

                let unknown = CpapError::UnknownChannel { label: label.clone() };
                prop_assert!(unknown.to_string().contains(&label));
                prop_assert!(!unknown.is_fatal_to_file());

                let header = CpapError::header_parse("Header validation", details.clone());
                prop_assert!(header.to_string().contains(&details));
                prop_assert!(header.is_fatal_to_file());
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CpapError>();

        let error = CpapError::header_parse("test", "test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_suggestions_are_provided() {
        let errors = [
            CpapError::header_parse("ctx", "bad"),
            CpapError::UnknownChannel { label: "Foo".to_string() },
            CpapError::checksum_failed(PathBuf::from("x.edf"), "mismatch"),
            CpapError::SignalIndex { index: 4, count: 2 },
        ];
        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn io_errors_convert_to_file_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        match CpapError::from(io_err) {
            CpapError::File { source, .. } => assert_eq!(source.to_string(), "test file"),
            other => panic!("Expected File error variant, got {:?}", other),
        }
    }

    #[test]
    fn only_structural_errors_are_fatal() {
        assert!(CpapError::OutOfBounds { offset: 0, requested: 2, len: 1 }.is_fatal_to_file());
        assert!(CpapError::truncated_field("label", 0, 16, 3).is_fatal_to_file());
        assert!(!CpapError::SignalIndex { index: 9, count: 3 }.is_fatal_to_file());
        assert!(!CpapError::config_error("bad key", None).is_fatal_to_file());
    }
}
