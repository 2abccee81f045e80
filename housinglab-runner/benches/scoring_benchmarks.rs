//! Criterion benchmarks for the feature and scoring stages.
//!
//! Run with: `cargo bench -p housinglab-runner`
//!
//! - Feature engineering over a metro master (calendar-lag lookups)
//! - Scoring and the six-profile sensitivity sweep over county-sized candidate sets

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use housinglab_core::domain::month::add_months;
use housinglab_core::domain::{CbsaCode, MasterRecord};
use housinglab_runner::features::engineer;
use housinglab_runner::scoring::{
    score_candidates, sensitivity, Candidate, Normalization, ScoreWeights,
};

fn master(metros: usize, months: i32) -> Vec<MasterRecord> {
    let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let mut out = Vec::with_capacity(metros * months as usize);
    for m in 0..metros {
        let code = CbsaCode::parse(&format!("{:05}", 10_000 + m)).unwrap();
        for i in 0..months {
            let mut r = MasterRecord::new(add_months(start, i).unwrap(), code.clone());
            r.home_value = Some(200_000.0 * (1.0 + 0.004 * i as f64) + m as f64 * 1_000.0);
            r.rent_index = Some(1_400.0 + i as f64 * 2.0);
            r.inventory = Some(5_000.0 - (i % 24) as f64 * 10.0);
            out.push(r);
        }
    }
    out
}

fn candidates(n: usize) -> Vec<Candidate> {
    (0..n)
        .map(|i| Candidate {
            key: format!("{:05}", i),
            name: format!("County {i}"),
            latest_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            price: 150_000.0 + (i * 7_919 % 900_000) as f64,
            yoy_pct: Some((i % 17) as f64 - 4.0),
            cagr_3y_pct: (i % 5 != 0).then(|| (i % 11) as f64 - 2.0),
            pop_growth_pct: Some((i % 13) as f64 * 0.3 - 1.0),
            yield_pct: Some(3.0 + (i % 9) as f64 * 0.5),
            yield_estimated: false,
            history_months: 120,
        })
        .collect()
}

fn bench_engineer(c: &mut Criterion) {
    let mut group = c.benchmark_group("engineer");
    for metros in [17, 100, 400] {
        let records = master(metros, 300);
        group.bench_with_input(BenchmarkId::from_parameter(metros), &records, |b, records| {
            b.iter(|| {
                let _ = engineer(black_box(records));
            });
        });
    }
    group.finish();
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_candidates");
    let weights = ScoreWeights::default();
    for n in [17, 254, 3_000] {
        let set = candidates(n);
        for (label, norm) in [
            ("min_max", Normalization::MinMax),
            ("percentile", Normalization::PercentileRank),
            ("z_score", Normalization::ZScore),
        ] {
            group.bench_with_input(BenchmarkId::new(label, n), &set, |b, set| {
                b.iter(|| {
                    let _ = score_candidates(black_box(set), &weights, norm);
                });
            });
        }
    }
    group.finish();
}

fn bench_sensitivity(c: &mut Criterion) {
    let set = candidates(254);
    c.bench_function("sensitivity_254", |b| {
        b.iter(|| {
            let _ = sensitivity(black_box(&set), Normalization::MinMax);
        });
    });
}

criterion_group!(benches, bench_engineer, bench_score, bench_sensitivity);
criterion_main!(benches);
