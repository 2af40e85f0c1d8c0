//! Reader for the SD cards written by ResMed AirSense / AirCurve CPAP devices.
//!
//! A card holds a daily summary file (`STR.edf`) and per-night EDF recordings
//! under `DATALOG/<YYYYMMDD>/`. This crate decodes both, verifies their
//! checksum siblings and reconciles the recordings into therapy sessions.
//!
//! # Features
//!
//! - **Lazy EDF decoding**: header, signal headers and samples are parsed on
//!   first use and cached, from plain or gzip-compressed files
//! - **Firmware tolerance**: the summary dialect repairs drifting labels,
//!   bogus units and malformed ranges, recording a [`ParseWarning`] each time
//! - **Channel catalog**: device labels map to stable [`channels::ChannelId`]s
//!   with canonical units
//! - **Session reconciliation**: data file groups are matched to the summary's
//!   mask-on/mask-off boundaries, unmatched groups become their own sessions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cpap_sd::SdCard;
//!
//! fn main() -> cpap_sd::Result<()> {
//!     let card = SdCard::open("/media/SDCARD")?;
//!     for session in card.sessions() {
//!         println!("{} #{}: {}", session.date, session.sequence, session.duration());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Reading a single file
//!
//! ```rust,no_run
//! use cpap_sd::{EdfReader, types::Decoded};
//!
//! fn main() -> cpap_sd::Result<()> {
//!     let mut reader = EdfReader::open("DATALOG/20240301/20240301_020500_BRP.edf")?;
//!     let flow = reader.signal_index("Flow.40ms")?.unwrap_or(0);
//!     if let Decoded::Physical(values) = reader.get_physical_values(flow)? {
//!         println!("{} flow samples", values.len());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding layers
pub mod bytes;
pub mod channels;
pub mod checksum;
pub mod edf;
pub mod summary;

// Card layout and sessions
pub mod card;
pub mod config;
pub mod reconcile;
pub mod scanner;

// Core exports
pub use error::*;
pub use types::*;

pub use card::{CardIssue, SdCard};
pub use checksum::{ChecksumVerifier, CrcMode, CrcStatus};
pub use config::ReaderConfig;
pub use edf::{EdfReader, Header};
pub use reconcile::ReconcilePolicy;
pub use scanner::ScanReport;
pub use summary::SummaryFile;
