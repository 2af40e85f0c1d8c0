//! EDF+ annotation lists.
//!
//! Event files store annotations in a signal labelled `EDF Annotations`
//! whose "samples" are raw bytes. Each data record holds time-stamped
//! annotation lists (TALs):
//!
//! ```text
//! +onset[\x15duration]\x14text\x14[text\x14...]\x00
//! ```
//!
//! The first TAL of every record has an empty text and only timestamps the
//! record.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::trace;

const ONSET_DURATION_SEPARATOR: u8 = 0x15;
const TEXT_SEPARATOR: u8 = 0x14;
const TAL_TERMINATOR: u8 = 0x00;

/// One annotation, timed relative to the recording start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    /// Seconds after the recording start.
    pub onset: f64,
    /// Seconds, when given.
    pub duration: Option<f64>,
    pub text: String,
}

impl Annotation {
    /// Absolute instant given the recording start, `None` if the onset is
    /// outside the representable date range.
    pub fn at(&self, recording_start: NaiveDateTime) -> Option<NaiveDateTime> {
        let millis = (self.onset * 1000.0).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        let offset = TimeDelta::try_milliseconds(millis as i64)?;
        recording_start.checked_add_signed(offset)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_text(&self.text)
    }
}

/// Respiratory event categories reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    ObstructiveApnea,
    CentralApnea,
    Hypopnea,
    /// Apnea the device did not classify.
    Apnea,
    Rera,
    FlowLimitation,
    VibratorySnore,
    PeriodicBreathing,
    CheyneStokes,
    LargeLeak,
    Other,
}

const EVENT_TEXTS: &[(&str, EventKind)] = &[
    ("obstructive apnea", EventKind::ObstructiveApnea),
    ("obstructive", EventKind::ObstructiveApnea),
    ("oa", EventKind::ObstructiveApnea),
    ("central apnea", EventKind::CentralApnea),
    ("clear airway", EventKind::CentralApnea),
    ("central", EventKind::CentralApnea),
    ("ca", EventKind::CentralApnea),
    ("hypopnea", EventKind::Hypopnea),
    ("h", EventKind::Hypopnea),
    ("apnea", EventKind::Apnea),
    ("rera", EventKind::Rera),
    ("arousal", EventKind::Rera),
    ("flow limitation", EventKind::FlowLimitation),
    ("fl", EventKind::FlowLimitation),
    ("vibratory snore", EventKind::VibratorySnore),
    ("vs", EventKind::VibratorySnore),
    ("periodic breathing", EventKind::PeriodicBreathing),
    ("pb", EventKind::PeriodicBreathing),
    ("cheyne-stokes", EventKind::CheyneStokes),
    ("csr", EventKind::CheyneStokes),
    ("large leak", EventKind::LargeLeak),
    ("ll", EventKind::LargeLeak),
];

impl EventKind {
    /// Classify annotation text: exact match first, then the first phrase
    /// (longer than two characters) contained in the text.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim().to_ascii_lowercase();
        EVENT_TEXTS
            .iter()
            .find(|(phrase, _)| *phrase == text)
            .or_else(|| {
                EVENT_TEXTS.iter().find(|(phrase, _)| phrase.len() > 2 && text.contains(phrase))
            })
            .map_or(EventKind::Other, |(_, kind)| *kind)
    }
}

/// Parse the annotation bytes of one data record.
///
/// Malformed TALs are skipped; the record-timekeeping TAL yields nothing.
pub fn parse_tals(bytes: &[u8]) -> Vec<Annotation> {
    let mut annotations = Vec::new();

    for tal in bytes.split(|&b| b == TAL_TERMINATOR).filter(|tal| !tal.is_empty()) {
        let mut parts = tal.split(|&b| b == TEXT_SEPARATOR);
        let Some(timing) = parts.next() else { continue };
        let Some((onset, duration)) = parse_timing(timing) else {
            trace!(tal = %String::from_utf8_lossy(tal), "Skipping malformed TAL");
            continue;
        };

        for text in parts.filter(|text| !text.is_empty()) {
            annotations.push(Annotation {
                onset,
                duration,
                text: String::from_utf8_lossy(text).trim().to_string(),
            });
        }
    }

    annotations
}

fn parse_timing(timing: &[u8]) -> Option<(f64, Option<f64>)> {
    let timing = std::str::from_utf8(timing).ok()?;
    let (onset, duration) = match timing.split_once(char::from(ONSET_DURATION_SEPARATOR)) {
        Some((onset, duration)) => (onset, Some(duration)),
        None => (timing, None),
    };

    if !onset.starts_with(['+', '-']) {
        return None;
    }
    let onset: f64 = onset.parse().ok().filter(|value: &f64| value.is_finite())?;
    let duration = match duration {
        Some(text) if !text.is_empty() => {
            Some(text.parse().ok().filter(|value: &f64| value.is_finite())?)
        }
        _ => None,
    };
    Some((onset, duration))
}

/// Reassemble annotation bytes from `i16` samples as stored on disk.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}
