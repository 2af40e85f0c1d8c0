//! Session reconciliation
//!
//! Stitches scanned file groups to the session boundaries of the summary
//! file. Matching is a heuristic interval join:
//!
//! 1. A group whose window intersects one or more boundaries (closed
//!    intervals) goes to the boundary with the largest overlap. Ties go to the
//!    boundary whose start is closest to the window start, then to the
//!    earliest boundary.
//! 2. A group intersecting nothing goes to the nearest boundary within the
//!    merge tolerance.
//! 3. Anything else becomes its own session, flagged unmatched.
//!
//! Every boundary yields exactly one session, with or without files, so days
//! with more groups than boundaries partition strictly by the boundaries.
//! The assignment step is [`ReconcilePolicy::assign`], a pure function that
//! can be tested without touching the filesystem.

use crate::types::{
    Attribution, Disposition, FileGroup, Session, SessionBoundary, TimeWindow,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Default merge tolerance in seconds.
pub const DEFAULT_MERGE_TOLERANCE_SECS: i64 = 15 * 60;

/// A scanned group together with the time window it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub group: FileGroup,
    pub window: TimeWindow,
}

/// Assignment rules for [`reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Largest gap across which a non-intersecting group still joins a boundary.
    pub merge_tolerance: TimeDelta,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self { merge_tolerance: TimeDelta::seconds(DEFAULT_MERGE_TOLERANCE_SECS) }
    }
}

impl ReconcilePolicy {
    pub fn new(merge_tolerance: TimeDelta) -> Self {
        Self { merge_tolerance: merge_tolerance.max(TimeDelta::zero()) }
    }

    /// One disposition per window, indexing into `boundaries`.
    pub fn assign(&self, boundaries: &[SessionBoundary], windows: &[TimeWindow]) -> Vec<Disposition> {
        windows.iter().map(|window| self.assign_one(boundaries, window)).collect()
    }

    fn assign_one(&self, boundaries: &[SessionBoundary], window: &TimeWindow) -> Disposition {
        let overlapping = boundaries
            .iter()
            .enumerate()
            .filter_map(|(index, boundary)| {
                let start = boundary.start.max(window.start);
                let end = boundary.end.min(window.end);
                (start <= end).then(|| (index, boundary, end - start))
            })
            .min_by_key(|(index, boundary, overlap)| {
                let proximity = (boundary.start - window.start).abs();
                (Reverse(*overlap), proximity, boundary.start, *index)
            });

        if let Some((boundary, _, overlap)) = overlapping {
            return Disposition::Overlap { boundary, overlap_secs: overlap.num_seconds() };
        }

        let nearest = boundaries
            .iter()
            .enumerate()
            .map(|(index, boundary)| {
                let gap = if window.end < boundary.start {
                    boundary.start - window.end
                } else {
                    window.start - boundary.end
                };
                (index, boundary, gap)
            })
            .min_by_key(|(index, boundary, gap)| (*gap, boundary.start, *index));

        match nearest {
            Some((boundary, _, gap)) if gap <= self.merge_tolerance => {
                Disposition::Nearest { boundary, gap_secs: gap.num_seconds() }
            }
            _ => Disposition::Unmatched,
        }
    }
}

/// Build the sessions for a card.
///
/// Sessions come back ordered by start and numbered per day. Every candidate
/// appears in exactly one session's attributions.
pub fn reconcile(
    boundaries: &[SessionBoundary],
    candidates: Vec<Candidate>,
    policy: &ReconcilePolicy,
) -> Vec<Session> {
    let windows: Vec<TimeWindow> = candidates.iter().map(|candidate| candidate.window).collect();
    let dispositions = policy.assign(boundaries, &windows);

    let mut matched: HashMap<usize, Vec<(Candidate, Disposition)>> = HashMap::new();
    let mut sessions = Vec::new();

    for (candidate, disposition) in candidates.into_iter().zip(dispositions) {
        trace!(
            date = %candidate.group.date,
            key = %candidate.group.key,
            ?disposition,
            "Assigned file group"
        );
        match disposition.boundary() {
            Some(index) => matched.entry(index).or_default().push((candidate, disposition)),
            None => sessions.push(build_session(
                candidate.window.start,
                candidate.window.end,
                None,
                vec![(candidate, disposition)],
            )),
        }
    }
    let unmatched = sessions.len();

    for (index, boundary) in boundaries.iter().enumerate() {
        let members = matched.remove(&index).unwrap_or_default();
        sessions.push(build_session(boundary.start, boundary.end, Some(*boundary), members));
    }

    sessions.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for session in &mut sessions {
        let next = per_day.entry(session.date).or_default();
        session.sequence = *next;
        *next += 1;
    }

    debug!(
        sessions = sessions.len(),
        boundaries = boundaries.len(),
        unmatched,
        summary_only = sessions.iter().filter(|s| s.is_summary_only()).count(),
        "Reconciled sessions"
    );
    sessions
}

fn build_session(
    start: NaiveDateTime,
    end: NaiveDateTime,
    boundary: Option<SessionBoundary>,
    mut members: Vec<(Candidate, Disposition)>,
) -> Session {
    members.sort_by(|a, b| a.0.window.start.cmp(&b.0.window.start));

    let mut files = BTreeMap::new();
    let mut attributions = Vec::with_capacity(members.len());
    for (candidate, disposition) in members {
        attributions.push(Attribution {
            key: candidate.group.key,
            window: candidate.window,
            disposition,
        });
        for file in candidate.group.files {
            files.entry(file.kind).or_insert_with(Vec::new).push(file);
        }
    }

    Session {
        date: start.date(),
        start,
        end,
        sequence: 0,
        files,
        unmatched: boundary.is_none(),
        boundary,
        attributions,
    }
}
