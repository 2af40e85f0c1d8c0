//! Benchmarks for session reconciliation
//!
//! Tests assignment performance for a year of nights with:
//! - One group per boundary
//! - Oversegmented nights (several groups per boundary, some in the gaps)

use chrono::{NaiveDate, TimeDelta};
use cpap_sd::reconcile::{Candidate, ReconcilePolicy, reconcile};
use cpap_sd::types::{FileGroup, GroupKey, SessionBoundary, TimeWindow, WindowSource};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn boundaries(days: usize) -> Vec<SessionBoundary> {
    let first = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
    (0..days)
        .flat_map(|day| {
            let night = first.and_hms_opt(22, 0, 0).expect("valid time") + TimeDelta::days(day as i64);
            [
                SessionBoundary { start: night, end: night + TimeDelta::hours(3), slot: 0 },
                SessionBoundary {
                    start: night + TimeDelta::hours(3) + TimeDelta::minutes(20),
                    end: night + TimeDelta::hours(8),
                    slot: 1,
                },
            ]
        })
        .collect()
}

/// `per_boundary` groups spread over each boundary, starting 5 minutes early.
fn candidates(boundaries: &[SessionBoundary], per_boundary: usize) -> Vec<Candidate> {
    boundaries
        .iter()
        .flat_map(|boundary| {
            let step = boundary.duration() / per_boundary as i32;
            (0..per_boundary).map(move |i| {
                let start = boundary.start - TimeDelta::minutes(5) + step * i as i32;
                Candidate {
                    group: FileGroup {
                        date: start.date(),
                        key: GroupKey::Timestamp(start),
                        ordinal: i,
                        files: Vec::new(),
                    },
                    window: TimeWindow::new(start, start + step, WindowSource::Header),
                }
            })
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let boundaries = boundaries(365);
    let policy = ReconcilePolicy::default();

    let mut group = c.benchmark_group("reconcile_year");
    for per_boundary in [1usize, 4, 12] {
        let candidates = candidates(&boundaries, per_boundary);
        group.bench_with_input(
            BenchmarkId::from_parameter(per_boundary),
            &candidates,
            |b, candidates| {
                b.iter(|| {
                    let sessions = reconcile(&boundaries, candidates.clone(), &policy);
                    black_box(sessions.len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
