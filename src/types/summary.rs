//! Per-day records produced by the summary dialect.

use super::SessionBoundary;
use crate::channels::ChannelId;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;

/// Device-reported aggregates for one day.
///
/// Each field is `None` when the channel is absent or its slot was empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayStatistics {
    pub ahi: Option<f64>,
    pub apnea_index: Option<f64>,
    pub hypopnea_index: Option<f64>,
    pub obstructive_apnea_index: Option<f64>,
    pub central_apnea_index: Option<f64>,
    pub unclassified_apnea_index: Option<f64>,
    pub mask_events: Option<f64>,
    pub mask_pressure_median: Option<f64>,
    pub mask_pressure_95: Option<f64>,
    pub mask_pressure_max: Option<f64>,
    pub leak_median: Option<f64>,
    pub leak_95: Option<f64>,
    pub leak_max: Option<f64>,
    /// Minutes.
    pub duration: Option<f64>,
    /// Minutes with the mask on.
    pub on_duration: Option<f64>,
    pub tidal_volume_median: Option<f64>,
    pub minute_ventilation_median: Option<f64>,
    pub respiratory_rate_median: Option<f64>,
    pub spo2_median: Option<f64>,
    pub spo2_95: Option<f64>,
}

impl DayStatistics {
    /// Channels that feed a statistics field.
    pub const CHANNELS: [ChannelId; 20] = [
        ChannelId::Ahi,
        ChannelId::ApneaIndex,
        ChannelId::HypopneaIndex,
        ChannelId::ObstructiveApneaIndex,
        ChannelId::CentralApneaIndex,
        ChannelId::UnclassifiedApneaIndex,
        ChannelId::MaskEvents,
        ChannelId::MaskPressureMedian,
        ChannelId::MaskPressure95,
        ChannelId::MaskPressureMax,
        ChannelId::LeakMedian,
        ChannelId::Leak95,
        ChannelId::LeakMax,
        ChannelId::Duration,
        ChannelId::OnDuration,
        ChannelId::TidalVolumeMedian,
        ChannelId::MinuteVentilationMedian,
        ChannelId::RespiratoryRateMedian,
        ChannelId::Spo2Median,
        ChannelId::Spo295,
    ];

    fn field(&mut self, id: ChannelId) -> Option<&mut Option<f64>> {
        let field = match id {
            ChannelId::Ahi => &mut self.ahi,
            ChannelId::ApneaIndex => &mut self.apnea_index,
            ChannelId::HypopneaIndex => &mut self.hypopnea_index,
            ChannelId::ObstructiveApneaIndex => &mut self.obstructive_apnea_index,
            ChannelId::CentralApneaIndex => &mut self.central_apnea_index,
            ChannelId::UnclassifiedApneaIndex => &mut self.unclassified_apnea_index,
            ChannelId::MaskEvents => &mut self.mask_events,
            ChannelId::MaskPressureMedian => &mut self.mask_pressure_median,
            ChannelId::MaskPressure95 => &mut self.mask_pressure_95,
            ChannelId::MaskPressureMax => &mut self.mask_pressure_max,
            ChannelId::LeakMedian => &mut self.leak_median,
            ChannelId::Leak95 => &mut self.leak_95,
            ChannelId::LeakMax => &mut self.leak_max,
            ChannelId::Duration => &mut self.duration,
            ChannelId::OnDuration => &mut self.on_duration,
            ChannelId::TidalVolumeMedian => &mut self.tidal_volume_median,
            ChannelId::MinuteVentilationMedian => &mut self.minute_ventilation_median,
            ChannelId::RespiratoryRateMedian => &mut self.respiratory_rate_median,
            ChannelId::Spo2Median => &mut self.spo2_median,
            ChannelId::Spo295 => &mut self.spo2_95,
            _ => return None,
        };
        Some(field)
    }

    /// Value for a channel, `None` if absent or not a statistics channel.
    pub fn get(&self, id: ChannelId) -> Option<f64> {
        let mut copy = *self;
        copy.field(id).and_then(|value| *value)
    }

    /// Set a field if it is still empty. Returns whether the value was taken.
    pub(crate) fn fill(&mut self, id: ChannelId, value: f64) -> bool {
        match self.field(id) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value);
                true
            }
            _ => false,
        }
    }
}

/// Boundary pairs dropped while building a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryAnomalies {
    /// Pairs with mask-on at or after mask-off.
    pub inverted: usize,
    /// Pairs overlapping an earlier boundary of the same day.
    pub overlapping: usize,
}

impl BoundaryAnomalies {
    pub fn total(&self) -> usize {
        self.inverted + self.overlapping
    }
}

/// One calendar day of the summary file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub date: NaiveDate,
    /// Index of the first data record covering this day.
    pub first_record: usize,
    /// Number of data records merged into this day.
    pub record_count: usize,
    pub statistics: DayStatistics,
    /// Sorted, non-overlapping.
    pub boundaries: Vec<SessionBoundary>,
    pub anomalies: BoundaryAnomalies,
}

impl SummaryRecord {
    pub fn new(date: NaiveDate, first_record: usize) -> Self {
        Self {
            date,
            first_record,
            record_count: 0,
            statistics: DayStatistics::default(),
            boundaries: Vec::new(),
            anomalies: BoundaryAnomalies::default(),
        }
    }

    /// Sum of boundary durations.
    pub fn therapy_time(&self) -> TimeDelta {
        self.boundaries.iter().map(SessionBoundary::duration).sum()
    }

    /// Boundary containing `instant`, if any.
    pub fn boundary_at(&self, instant: NaiveDateTime) -> Option<&SessionBoundary> {
        self.boundaries.iter().find(|boundary| boundary.contains(instant))
    }
}
