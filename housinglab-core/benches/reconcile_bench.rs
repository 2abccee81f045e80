//! Criterion benchmarks for the reconciler.
//!
//! Benchmarks:
//! 1. Zillow wide → long normalization (900 regions x 25 years of months)
//! 2. Outer join of five sources over 17 metros

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use housinglab_core::data::RawTable;
use housinglab_core::domain::{Field, MetroReference};
use housinglab_core::reconcile::merge::{outer_join, NormalizedTable};
use housinglab_core::reconcile::{zillow, RegionMatcher, SourceTrace};

// ── Helpers ──────────────────────────────────────────────────────────

fn months(n: usize) -> Vec<NaiveDate> {
    (0..n)
        .map(|i| {
            let y = 2000 + (i / 12) as i32;
            let m = (i % 12) as u32 + 1;
            NaiveDate::from_ymd_opt(y, m, 1).unwrap()
        })
        .collect()
}

fn wide_zillow_csv(regions: usize, n_months: usize) -> String {
    let reference = MetroReference::default_targets();
    let mut out = String::from("RegionID,SizeRank,RegionName,RegionType,StateName");
    for d in months(n_months) {
        out.push_str(&format!(",{}", d.format("%Y-%m-28")));
    }
    out.push('\n');
    for r in 0..regions {
        let name = match reference.entries().get(r) {
            Some(e) => e.zillow_name.clone().unwrap_or_default(),
            None => format!("Town {r}, ZZ"),
        };
        out.push_str(&format!("{r},{r},\"{name}\",msa,ZZ"));
        for i in 0..n_months {
            out.push_str(&format!(",{}", 200_000 + r * 10 + i));
        }
        out.push('\n');
    }
    out
}

fn synthetic_tables(n_months: usize) -> Vec<NormalizedTable<String>> {
    let reference = MetroReference::default_targets();
    let dates = months(n_months);
    [
        Field::HomeValue,
        Field::RentIndex,
        Field::Population,
        Field::Employment,
        Field::Hpi,
    ]
    .into_iter()
    .map(|field| {
        let mut t = NormalizedTable::new(SourceTrace::new(field.column(), "bench"));
        for e in reference.entries() {
            for (i, d) in dates.iter().enumerate() {
                t.push(e.cbsa_code.to_string(), *d, field, i as f64);
            }
        }
        t
    })
    .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_zillow_normalize(c: &mut Criterion) {
    let csv = wide_zillow_csv(900, 300);
    let table = RawTable::from_reader("bench.csv", csv.as_bytes()).unwrap();
    let matcher = RegionMatcher::new(&MetroReference::default_targets());
    c.bench_function("zillow_normalize_900x300", |b| {
        b.iter(|| {
            zillow::normalize_metro(black_box(&table), &zillow::METRO_FILES[0], &matcher).unwrap()
        })
    });
}

fn bench_outer_join(c: &mut Criterion) {
    let tables = synthetic_tables(300);
    c.bench_function("outer_join_5x17x300", |b| {
        b.iter(|| outer_join(black_box(&tables)).unwrap())
    });
}

criterion_group!(benches, bench_zillow_normalize, bench_outer_join);
criterion_main!(benches);
