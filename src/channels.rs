//! Static channel catalog.
//!
//! Maps the labels written by different firmware revisions onto canonical
//! `(name, unit, scale)` entries. The table is immutable; supporting a new
//! firmware label means adding it to an entry's `labels`, never a new code
//! path.

use crate::{CpapError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Canonical channel identity, independent of the label a firmware wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChannelId {
    // Waveforms
    MaskPressure,
    MaskPressureLow,
    Pressure,
    Epap,
    Ipap,
    FlowRate,
    LeakRate,
    TotalLeak,
    TidalVolume,
    MinuteVentilation,
    RespiratoryRate,
    TargetVentilation,
    FlowLimitation,
    Snore,
    InspirationTime,
    ExpirationTime,
    IeRatio,
    Spo2,
    PulseRate,
    // Bookkeeping
    Annotations,
    Crc,
    Date,
    // Session boundaries
    MaskOn,
    MaskOff,
    MaskEvents,
    Duration,
    OnDuration,
    // Daily aggregates
    Ahi,
    ApneaIndex,
    HypopneaIndex,
    ObstructiveApneaIndex,
    CentralApneaIndex,
    UnclassifiedApneaIndex,
    Rin,
    CheyneStokes,
    MaskPressureMedian,
    MaskPressure95,
    MaskPressureMax,
    LeakMedian,
    Leak95,
    LeakMax,
    TidalVolumeMedian,
    MinuteVentilationMedian,
    RespiratoryRateMedian,
    Spo2Median,
    Spo295,
}

/// What kind of data a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelRole {
    /// Continuous per-session samples.
    Waveform,
    /// One value per day in the summary file.
    DailyAggregate,
    /// Session on/off instants in the summary file.
    SessionTime,
    /// EDF+ annotation bytes.
    Annotation,
    /// Checksum or date bookkeeping, carries no clinical value.
    Bookkeeping,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSpec {
    pub id: ChannelId,
    /// Every label known to denote this channel, across firmware revisions.
    pub labels: &'static [&'static str],
    /// Canonical display name.
    pub name: &'static str,
    /// Canonical unit after applying `scale`.
    pub unit: &'static str,
    /// Unit the device writes the physical values in.
    pub native_unit: &'static str,
    /// Multiplier from `native_unit` to `unit`.
    pub scale: f64,
    pub role: ChannelRole,
}

macro_rules! channel {
    ($id:ident, [$($label:literal),+ $(,)?], $name:literal, $unit:literal, $role:ident) => {
        channel!($id, [$($label),+], $name, $unit, $unit, 1.0, $role)
    };
    ($id:ident, [$($label:literal),+ $(,)?], $name:literal, $unit:literal, $native:literal, $scale:expr, $role:ident) => {
        ChannelSpec {
            id: ChannelId::$id,
            labels: &[$($label),+],
            name: $name,
            unit: $unit,
            native_unit: $native,
            scale: $scale,
            role: ChannelRole::$role,
        }
    };
}

/// The full catalog.
pub static CATALOG: &[ChannelSpec] = &[
    channel!(MaskPressure, ["Press.40ms", "Press", "MaskPressure"], "Mask Pressure", "cmH2O", Waveform),
    channel!(MaskPressureLow, ["MaskPress.2s", "MaskPress"], "Mask Pressure (Low)", "cmH2O", Waveform),
    channel!(Pressure, ["Press.2s", "Pressure"], "Pressure", "cmH2O", Waveform),
    channel!(Epap, ["EprPress.2s", "EprPress", "EPAP", "S.BL.EPAP"], "EPAP", "cmH2O", Waveform),
    channel!(Ipap, ["IPAP"], "Inspiratory PAP", "cmH2O", Waveform),
    channel!(FlowRate, ["Flow.40ms", "Flow", "Flow.2s"], "Flow Rate", "L/min", "L/s", 60.0, Waveform),
    channel!(LeakRate, ["Leak.2s", "Leak", "LeakRate"], "Leak Rate", "L/min", "L/s", 60.0, Waveform),
    channel!(TotalLeak, ["TotalLeak"], "Total Leak", "L/min", Waveform),
    channel!(TidalVolume, ["TidVol.2s", "TidVol", "Tidal Volume"], "Tidal Volume", "L", Waveform),
    channel!(MinuteVentilation, ["MinVent.2s", "MinVent"], "Minute Ventilation", "L/min", Waveform),
    channel!(RespiratoryRate, ["RespRate.2s", "RespRate"], "Respiratory Rate", "bpm", Waveform),
    channel!(TargetVentilation, ["TgtVent.2s", "TgMV"], "Target Ventilation", "L/min", Waveform),
    channel!(FlowLimitation, ["FlowLim.2s", "FlowLim"], "Flow Limitation", "index", Waveform),
    channel!(Snore, ["Snore.2s", "Snore"], "Snore", "index", Waveform),
    channel!(InspirationTime, ["InspTime", "Ti.2s"], "Inspiration Time", "s", Waveform),
    channel!(ExpirationTime, ["ExpTime", "Te.2s"], "Expiration Time", "s", Waveform),
    channel!(IeRatio, ["IERatio", "IER.2s"], "I:E Ratio", "ratio", Waveform),
    channel!(Spo2, ["SpO2.1s", "SpO2"], "Oxygen Saturation", "%", Waveform),
    channel!(PulseRate, ["Pulse.1s", "Pulse"], "Pulse Rate", "bpm", Waveform),
    channel!(Annotations, ["EDF Annotations", "Annotations"], "Event Annotations", "", Annotation),
    channel!(Crc, ["Crc16", "CRC"], "Checksum", "", Bookkeeping),
    channel!(Date, ["Date"], "Date", "days", Bookkeeping),
    channel!(MaskOn, ["MaskOn", "Mask On"], "Mask On", "s", SessionTime),
    channel!(MaskOff, ["MaskOff", "Mask Off"], "Mask Off", "s", SessionTime),
    channel!(MaskEvents, ["MaskEvents", "Mask Events"], "Mask Events", "count", DailyAggregate),
    channel!(Duration, ["Duration"], "Duration", "min", DailyAggregate),
    channel!(OnDuration, ["OnDuration", "On Duration"], "On Duration", "min", DailyAggregate),
    channel!(Ahi, ["AHI"], "AHI", "events/hour", DailyAggregate),
    channel!(ApneaIndex, ["AI"], "Apnea Index", "events/hour", DailyAggregate),
    channel!(HypopneaIndex, ["HI"], "Hypopnea Index", "events/hour", DailyAggregate),
    channel!(ObstructiveApneaIndex, ["OAI"], "Obstructive Apnea Index", "events/hour", DailyAggregate),
    channel!(CentralApneaIndex, ["CAI"], "Central Apnea Index", "events/hour", DailyAggregate),
    channel!(UnclassifiedApneaIndex, ["UAI"], "Unclassified Apnea Index", "events/hour", DailyAggregate),
    channel!(Rin, ["RIN"], "RIN", "events/hour", DailyAggregate),
    channel!(CheyneStokes, ["CSR"], "Cheyne-Stokes Respiration", "min", DailyAggregate),
    channel!(MaskPressureMedian, ["MaskPress.50"], "Mask Pressure Median", "cmH2O", DailyAggregate),
    channel!(MaskPressure95, ["MaskPress.95"], "Mask Pressure 95th", "cmH2O", DailyAggregate),
    channel!(MaskPressureMax, ["MaskPress.Max"], "Mask Pressure Max", "cmH2O", DailyAggregate),
    channel!(LeakMedian, ["Leak.50"], "Leak Median", "L/min", "L/s", 60.0, DailyAggregate),
    channel!(Leak95, ["Leak.95"], "Leak 95th", "L/min", "L/s", 60.0, DailyAggregate),
    channel!(LeakMax, ["Leak.Max"], "Leak Max", "L/min", "L/s", 60.0, DailyAggregate),
    channel!(TidalVolumeMedian, ["TidVol.50"], "Tidal Volume Median", "L", DailyAggregate),
    channel!(MinuteVentilationMedian, ["MinVent.50"], "Minute Ventilation Median", "L/min", DailyAggregate),
    channel!(RespiratoryRateMedian, ["RespRate.50"], "Respiratory Rate Median", "bpm", DailyAggregate),
    channel!(Spo2Median, ["SpO2.50"], "SpO2 Median", "%", DailyAggregate),
    channel!(Spo295, ["SpO2.95"], "SpO2 95th", "%", DailyAggregate),
];

static BY_LABEL: LazyLock<HashMap<String, &'static ChannelSpec>> = LazyLock::new(|| {
    let mut map = HashMap::with_capacity(CATALOG.len() * 2);
    for spec in CATALOG {
        for label in spec.labels {
            map.insert(normalize(label), spec);
        }
    }
    map
});

fn normalize(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

/// Look a raw signal label up in the catalog (case-insensitive, trimmed).
///
/// Fails with [`CpapError::UnknownChannel`]; callers treat that as a
/// passthrough, never as a parse failure.
pub fn lookup(label: &str) -> Result<&'static ChannelSpec> {
    BY_LABEL
        .get(&normalize(label))
        .copied()
        .ok_or_else(|| CpapError::UnknownChannel { label: label.trim().to_string() })
}

/// Catalog entry for a channel id.
pub fn spec(id: ChannelId) -> &'static ChannelSpec {
    // Every ChannelId has exactly one entry; the test module checks it.
    CATALOG.iter().find(|spec| spec.id == id).unwrap_or(&CATALOG[0])
}

impl ChannelSpec {
    /// Factor converting a value expressed in `unit_written` to the canonical unit.
    pub fn factor_from(&self, unit_written: &str) -> f64 {
        if unit_written.trim().eq_ignore_ascii_case(self.native_unit) { self.scale } else { 1.0 }
    }
}
