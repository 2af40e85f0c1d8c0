//! Benchmarks for EDF decoding
//!
//! Tests parsing performance for:
//! - Header and signal-header parsing of a typical BRP file
//! - Full sample decode and physical conversion
//! - Gzip-compressed input
//! - Summary file parsing over a year of days

use chrono::NaiveDate;
use cpap_sd::test_utils::{EdfBuilder, SummaryBuilder, SummaryDay, datetime};
use cpap_sd::{EdfReader, SummaryFile};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// One night of breathing data at 25 Hz flow and 0.5 Hz pressure.
fn brp_file(minutes: usize) -> Vec<u8> {
    EdfBuilder::new()
        .start_at(datetime(2024, 3, 1, 23, 0, 0))
        .record_duration(60.0)
        .records(minutes)
        .signal("Flow.40ms", "L/s", (-2.0, 2.0), (-1000, 1000), 1500)
        .signal("Press.2s", "cmH2O", (0.0, 20.0), (0, 2000), 30)
        .signal("TrigCycEvt.40ms", "", (0.0, 3.0), (0, 3), 1500)
        .build()
}

fn bench_headers(c: &mut Criterion) {
    let data = brp_file(480);
    c.bench_function("parse_signal_headers", |b| {
        b.iter(|| {
            let mut reader = EdfReader::from_bytes(black_box(data.clone())).expect("valid file");
            black_box(reader.parse_signal_headers().expect("headers").len())
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for minutes in [60usize, 480] {
        let plain = brp_file(minutes);
        let compressed = cpap_sd::test_utils::gzip(&plain);
        group.throughput(Throughput::Bytes(plain.len() as u64));

        group.bench_with_input(BenchmarkId::new("plain", minutes), &plain, |b, data| {
            b.iter(|| {
                let mut reader = EdfReader::from_bytes(data.clone()).expect("valid file");
                let values = reader.get_physical_values(0).expect("flow decodes");
                black_box(values.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("gzip", minutes), &compressed, |b, data| {
            b.iter(|| {
                let mut reader = EdfReader::from_bytes(data.clone()).expect("valid file");
                let values = reader.get_physical_values(0).expect("flow decodes");
                black_box(values.len())
            })
        });
    }
    group.finish();
}

fn bench_summary(c: &mut Criterion) {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
    let mut builder = SummaryBuilder::new(start).minutes().slots(10);
    for day in 0..365 {
        let offset = (day % 30) as i16;
        builder = builder.day(
            SummaryDay::with_pairs(&[(60, 420), (1320 + offset, 1439)])
                .stat("AHI", (day % 50) as i16),
        );
    }
    let data = builder.build();

    c.bench_function("summary_year", |b| {
        b.iter(|| {
            let summary = SummaryFile::from_bytes(black_box(data.clone())).expect("summary parses");
            black_box(summary.records().len())
        })
    });
}

criterion_group!(benches, bench_headers, bench_decode, bench_summary);
criterion_main!(benches);
