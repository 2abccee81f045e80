//! Scoring behavior through the public API: weights, profiles, sensitivity.

use chrono::NaiveDate;
use housinglab_runner::scoring::{
    score_candidates, sensitivity, Candidate, Metric, Normalization, ScoreError, ScoreWeights,
    WeightProfile,
};

fn candidate(key: &str, name: &str, price: f64, yoy: f64, cagr: f64, pop: f64, yld: f64) -> Candidate {
    Candidate {
        key: key.to_string(),
        name: name.to_string(),
        latest_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
        price,
        yoy_pct: Some(yoy),
        cagr_3y_pct: Some(cagr),
        pop_growth_pct: Some(pop),
        yield_pct: Some(yld),
        yield_estimated: false,
        history_months: 60,
    }
}

fn market() -> Vec<Candidate> {
    vec![
        candidate("12420", "Austin", 450_000.0, 7.0, 5.0, 2.5, 4.8),
        candidate("41860", "San Francisco", 1_100_000.0, 1.0, 0.5, -0.3, 3.1),
        candidate("15380", "Buffalo", 230_000.0, 4.0, 6.0, -0.1, 8.2),
        candidate("38060", "Phoenix", 420_000.0, 3.0, 8.0, 1.8, 5.4),
    ]
}

// ── Weights ──

#[test]
fn weights_not_summing_to_100_are_rejected() {
    let weights = ScoreWeights::new(30.0, 40.0, 20.0, 5.0);
    let err = score_candidates(&market(), &weights, Normalization::MinMax).unwrap_err();
    assert!(matches!(err, ScoreError::InvalidWeights { .. }));
    assert!(err.to_string().contains("30/40/20/5"));
}

#[test]
fn negative_weight_is_rejected_even_when_sum_is_100() {
    let weights = ScoreWeights::new(50.0, 60.0, 0.0, -10.0);
    assert!(score_candidates(&market(), &weights, Normalization::MinMax).is_err());
}

#[test]
fn weight_list_parses_percent_signs() {
    let weights = ScoreWeights::parse_list("30%, 40%, 20%, 10%").unwrap();
    assert_eq!(weights, WeightProfile::Balanced.weights());
}

// ── Profiles ──

#[test]
fn every_profile_is_valid() {
    for profile in WeightProfile::ALL {
        profile.weights().validate().unwrap();
    }
}

#[test]
fn cash_flow_profile_favors_high_yield() {
    let scored = score_candidates(
        &market(),
        &WeightProfile::CashFlow.weights(),
        Normalization::MinMax,
    )
    .unwrap();
    assert_eq!(scored[0].candidate.name, "Buffalo");
}

#[test]
fn contributions_sum_to_total() {
    let scored = score_candidates(&market(), &ScoreWeights::default(), Normalization::MinMax).unwrap();
    for record in &scored {
        let sum: f64 = Metric::ALL.iter().map(|m| record.contributions.get(*m)).sum();
        assert!((sum - record.total).abs() < 1e-9);
    }
}

#[test]
fn z_score_mode_keeps_totals_in_range() {
    let mut set = market();
    set.push(candidate("99999", "Outlier", 9_000_000.0, -30.0, -25.0, -8.0, 1.0));
    let scored = score_candidates(
        &set,
        &WeightProfile::ZScore.weights(),
        Normalization::ZScore,
    )
    .unwrap();
    assert_eq!(scored.last().unwrap().candidate.name, "Outlier");
    for record in &scored {
        assert!((0.0..=100.0).contains(&record.total));
        for metric in Metric::ALL {
            assert!((0.0..=100.0).contains(&record.sub_scores.get(metric)));
        }
    }
}

// ── Sensitivity ──

#[test]
fn sensitivity_reports_a_rank_per_profile() {
    let rows = sensitivity(&market(), Normalization::MinMax).unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.ranks.len(), WeightProfile::ALL.len());
        assert!(row.best_rank() <= row.worst_rank());
        assert!(row.rank_under(WeightProfile::Balanced).is_some());
    }
    assert_eq!(rows[0].rank_under(WeightProfile::Balanced), Some(1));
}
