use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use udpst_rate_table::{RateTable, RateTableConfig};

fn bench_build(c: &mut Criterion) {
    let mut g = c.benchmark_group("rate_table_build");

    g.bench_function("default", |b| {
        b.iter(|| black_box(RateTable::build(black_box(RateTableConfig::default())).unwrap()))
    });

    g.bench_function("jumbo", |b| {
        b.iter(|| {
            black_box(
                RateTable::build(black_box(RateTableConfig { jumbo: true, ..RateTableConfig::default() }))
                    .unwrap(),
            )
        })
    });

    g.bench_function("traditional_mtu", |b| {
        b.iter(|| {
            black_box(
                RateTable::build(black_box(RateTableConfig {
                    traditional_mtu: true,
                    ..RateTableConfig::default()
                }))
                .unwrap(),
            )
        })
    });

    g.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let table = RateTable::build(RateTableConfig::default()).unwrap();
    let mut g = c.benchmark_group("rate_table_lookup");

    g.bench_function("row_mid", |b| {
        let mid = table.len() / 2;
        b.iter(|| black_box(table.row(black_box(mid))))
    });

    g.bench_function("aggregate_mbps_simplified", |b| {
        let row = *table.row(table.high_speed_threshold()).unwrap();
        b.iter(|| black_box(row.aggregate_mbps_simplified()))
    });

    g.finish();
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
