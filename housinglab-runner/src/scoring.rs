//! Investment scoring: weighted sum of normalized sub-scores.
//!
//! Four raw metrics are taken from each candidate's latest observation:
//! - **affordability**: `(median price − price) / median × 100`
//! - **growth**: `yoy% × 0.7 + cagr_3y% × 0.3` (z-score mode: `cagr_3y% × 0.7 + yoy% × 0.3`)
//! - **demographics**: population growth % over the entity's history × 10
//! - **yield**: rental yield %, or a price-tier estimate when no rent is known
//!
//! Each metric is normalized to 0–100 across the candidate set (min-max by
//! default; percentile rank and clipped z-score optional), then weighted by a
//! percent vector that must sum to 100. A missing raw metric scores 0 and is
//! listed in `missing`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use housinglab_core::domain::{Field, SeriesRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureRecord;

/// Allowed drift of the weight total from 100.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("invalid score weights {weights}: {reason}")]
    InvalidWeights { weights: String, reason: String },
}

// ─── Metrics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Affordability,
    Growth,
    Demographics,
    Yield,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Affordability,
        Metric::Growth,
        Metric::Demographics,
        Metric::Yield,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Affordability => "affordability",
            Metric::Growth => "growth",
            Metric::Demographics => "demographics",
            Metric::Yield => "yield",
        }
    }
}

/// One value per metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet<T> {
    pub affordability: T,
    pub growth: T,
    pub demographics: T,
    #[serde(rename = "yield")]
    pub yield_: T,
}

impl<T: Copy> MetricSet<T> {
    pub fn get(&self, metric: Metric) -> T {
        match metric {
            Metric::Affordability => self.affordability,
            Metric::Growth => self.growth,
            Metric::Demographics => self.demographics,
            Metric::Yield => self.yield_,
        }
    }

    pub fn set(&mut self, metric: Metric, value: T) {
        match metric {
            Metric::Affordability => self.affordability = value,
            Metric::Growth => self.growth = value,
            Metric::Demographics => self.demographics = value,
            Metric::Yield => self.yield_ = value,
        }
    }
}

// ─── Weights ────────────────────────────────────────────────────────

/// Percent weights over the four metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub affordability: f64,
    pub growth: f64,
    pub demographics: f64,
    #[serde(rename = "yield")]
    pub yield_: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        WeightProfile::Balanced.weights()
    }
}

impl ScoreWeights {
    pub const fn new(affordability: f64, growth: f64, demographics: f64, yield_: f64) -> Self {
        Self {
            affordability,
            growth,
            demographics,
            yield_,
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Affordability => self.affordability,
            Metric::Growth => self.growth,
            Metric::Demographics => self.demographics,
            Metric::Yield => self.yield_,
        }
    }

    pub fn total(&self) -> f64 {
        Metric::ALL.iter().map(|&m| self.get(m)).sum()
    }

    /// Weights must be finite, non-negative, and sum to 100.
    pub fn validate(&self) -> Result<(), ScoreError> {
        let invalid = |reason: String| ScoreError::InvalidWeights {
            weights: self.to_string(),
            reason,
        };
        for metric in Metric::ALL {
            let w = self.get(metric);
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(format!("{} weight must be >= 0", metric.label())));
            }
        }
        let total = self.total();
        if (total - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid(format!("weights sum to {total}, expected 100")));
        }
        Ok(())
    }

    /// Parse `"30,40,20,10"` (affordability, growth, demographics, yield).
    pub fn parse_list(raw: &str) -> Result<Self, ScoreError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        let invalid = |reason: String| ScoreError::InvalidWeights {
            weights: raw.to_string(),
            reason,
        };
        if parts.len() != 4 {
            return Err(invalid(format!("expected 4 values, got {}", parts.len())));
        }
        let mut values = [0.0; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .trim_end_matches('%')
                .parse::<f64>()
                .map_err(|_| invalid(format!("'{part}' is not a number")))?;
        }
        let weights = Self::new(values[0], values[1], values[2], values[3]);
        weights.validate()?;
        Ok(weights)
    }
}

impl fmt::Display for ScoreWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.affordability, self.growth, self.demographics, self.yield_
        )
    }
}

/// Named weight scenarios for the sensitivity report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightProfile {
    #[default]
    Balanced,
    GrowthHeavy,
    CashFlow,
    AffordableGrowth,
    DemographicsDriven,
    /// Weighting used with `Normalization::ZScore`.
    ZScore,
}

impl WeightProfile {
    pub const ALL: [WeightProfile; 6] = [
        WeightProfile::Balanced,
        WeightProfile::GrowthHeavy,
        WeightProfile::CashFlow,
        WeightProfile::AffordableGrowth,
        WeightProfile::DemographicsDriven,
        WeightProfile::ZScore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WeightProfile::Balanced => "balanced",
            WeightProfile::GrowthHeavy => "growth-heavy",
            WeightProfile::CashFlow => "cash-flow",
            WeightProfile::AffordableGrowth => "affordable-growth",
            WeightProfile::DemographicsDriven => "demographics-driven",
            WeightProfile::ZScore => "z-score",
        }
    }

    pub fn weights(self) -> ScoreWeights {
        match self {
            WeightProfile::Balanced => ScoreWeights::new(30.0, 40.0, 20.0, 10.0),
            WeightProfile::GrowthHeavy => ScoreWeights::new(20.0, 60.0, 10.0, 10.0),
            WeightProfile::CashFlow => ScoreWeights::new(20.0, 20.0, 10.0, 50.0),
            WeightProfile::AffordableGrowth => ScoreWeights::new(40.0, 40.0, 10.0, 10.0),
            WeightProfile::DemographicsDriven => ScoreWeights::new(25.0, 25.0, 40.0, 10.0),
            WeightProfile::ZScore => ScoreWeights::new(25.0, 50.0, 15.0, 10.0),
        }
    }
}

// ─── Normalization ──────────────────────────────────────────────────

/// How raw metrics are mapped onto 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `(x − min) / (max − min) × 100`; all-equal sets score 50.
    #[default]
    MinMax,
    /// Average-rank percentile × 100; a single value scores 50.
    PercentileRank,
    /// `clip((z + 3) / 6 × 100, 0, 100)` with the sample standard deviation;
    /// zero spread gives z = 0, so 50.
    ZScore,
}

impl Normalization {
    /// Normalize the present values; missing entries stay missing.
    pub fn apply(self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let present: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();
        let scaled = match self {
            Normalization::MinMax => min_max(&present.iter().map(|p| p.1).collect::<Vec<_>>()),
            Normalization::PercentileRank => {
                percentile_rank(&present.iter().map(|p| p.1).collect::<Vec<_>>())
            }
            Normalization::ZScore => z_score(&present.iter().map(|p| p.1).collect::<Vec<_>>()),
        };
        let mut out = vec![None; values.len()];
        for ((i, _), s) in present.into_iter().zip(scaled) {
            out[i] = Some(s);
        }
        out
    }

    /// `(yoy, cagr_3y)` blend of the growth metric.
    pub fn growth_blend(self) -> (f64, f64) {
        match self {
            Normalization::ZScore => (0.3, 0.7),
            Normalization::MinMax | Normalization::PercentileRank => (0.7, 0.3),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Normalization::MinMax => "min-max (0-100, all-equal = 50)",
            Normalization::PercentileRank => "percentile rank (0-100)",
            Normalization::ZScore => "z-score ((z+3)/6 x 100, clipped to 0-100)",
        }
    }
}

impl std::str::FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "min_max" | "minmax" => Ok(Normalization::MinMax),
            "percentile_rank" | "percentile" | "rank" => Ok(Normalization::PercentileRank),
            "z_score" | "zscore" | "z" => Ok(Normalization::ZScore),
            other => Err(format!("unknown normalization '{other}'")),
        }
    }
}

fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() || (max - min).abs() < f64::EPSILON {
        return vec![50.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min) * 100.0).collect()
}

fn z_score(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![50.0; n];
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let std = variance.sqrt();
    values
        .iter()
        .map(|v| {
            let z = if std > f64::EPSILON { (v - mean) / std } else { 0.0 };
            ((z + 3.0) / 6.0 * 100.0).clamp(0.0, 100.0)
        })
        .collect()
}

/// Tied values receive their average rank.
fn percentile_rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![50.0];
    }

    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0_f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && (indexed[j].1 - indexed[i].1).abs() < 1e-12 {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for idx in &indexed[i..j] {
            ranks[idx.0] = avg_rank;
        }
        i = j;
    }

    ranks
        .iter()
        .map(|r| (r - 1.0) / (n as f64 - 1.0) * 100.0)
        .collect()
}

// ─── Candidates ─────────────────────────────────────────────────────

/// Price-tier yield estimate (percent) for entities without rent data.
pub fn estimated_yield_pct(price: f64) -> f64 {
    if price < 350_000.0 {
        6.5
    } else if price < 450_000.0 {
        6.0
    } else if price < 550_000.0 {
        5.5
    } else if price < 700_000.0 {
        5.0
    } else {
        4.5
    }
}

/// Raw inputs for one entity, taken from its latest priced observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: String,
    pub name: String,
    pub latest_date: NaiveDate,
    pub price: f64,
    pub yoy_pct: Option<f64>,
    pub cagr_3y_pct: Option<f64>,
    pub pop_growth_pct: Option<f64>,
    pub yield_pct: Option<f64>,
    pub yield_estimated: bool,
    pub history_months: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub key: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<SkippedCandidate>,
}

/// Build one candidate per entity.
///
/// Entities with fewer than `min_history_months` home values are skipped with
/// a reason.
pub fn build_candidates<R: SeriesRecord>(
    records: &[FeatureRecord<R>],
    min_history_months: usize,
) -> CandidateSet {
    let mut groups: BTreeMap<String, Vec<&FeatureRecord<R>>> = BTreeMap::new();
    for r in records {
        groups.entry(r.record.entity_key()).or_default().push(r);
    }

    let mut set = CandidateSet::default();
    for (key, mut rows) in groups {
        rows.sort_by_key(|r| r.record.date());
        let name = rows
            .iter()
            .rev()
            .find_map(|r| r.record.entity_name())
            .unwrap_or(key.as_str())
            .to_string();

        let priced: Vec<&&FeatureRecord<R>> = rows
            .iter()
            .filter(|r| r.record.value(Field::HomeValue).is_some())
            .collect();
        if priced.len() < min_history_months.max(1) {
            let reason = format!(
                "only {} months of home values (need {})",
                priced.len(),
                min_history_months.max(1)
            );
            tracing::debug!(key = %key, reason = %reason, "skipping candidate");
            set.skipped.push(SkippedCandidate { key, name, reason });
            continue;
        }
        let Some(latest) = priced.last() else {
            continue;
        };
        let price = latest.record.value(Field::HomeValue).unwrap_or_default();

        let population: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.record.value(Field::Population))
            .collect();
        let pop_growth_pct = match (population.first(), population.last()) {
            (Some(&first), Some(&last)) if population.len() >= 2 && first > 0.0 => {
                Some((last - first) / first * 100.0)
            }
            _ => None,
        };

        let measured_yield = rows
            .iter()
            .rev()
            .find_map(|r| r.features.rental_yield)
            .map(|y| y * 100.0);
        let (yield_pct, yield_estimated) = match measured_yield {
            Some(y) => (Some(y), false),
            None => (Some(estimated_yield_pct(price)), true),
        };

        set.candidates.push(Candidate {
            key,
            name,
            latest_date: latest.record.date(),
            price,
            yoy_pct: latest.features.momentum_yoy.map(|v| v * 100.0),
            cagr_3y_pct: latest.features.price_cagr_3y.map(|v| v * 100.0),
            pop_growth_pct,
            yield_pct,
            yield_estimated,
            history_months: priced.len(),
        });
    }

    tracing::info!(
        candidates = set.candidates.len(),
        skipped = set.skipped.len(),
        "candidates built"
    );
    set
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Raw metric values for each candidate, in candidate order.
///
/// Affordability is linear in price with a negative slope, so under z-score
/// normalization it equals the inverted price z-score.
pub fn raw_metrics(
    candidates: &[Candidate],
    normalization: Normalization,
) -> Vec<MetricSet<Option<f64>>> {
    let (yoy_w, cagr_w) = normalization.growth_blend();
    let prices: Vec<f64> = candidates.iter().map(|c| c.price).collect();
    let median_price = median(&prices).filter(|m| *m > 0.0);

    candidates
        .iter()
        .map(|c| MetricSet {
            affordability: median_price.map(|m| (m - c.price) / m * 100.0),
            growth: match (c.yoy_pct, c.cagr_3y_pct) {
                (Some(yoy), Some(cagr)) => Some(yoy * yoy_w + cagr * cagr_w),
                _ => None,
            },
            demographics: c.pop_growth_pct.map(|g| g * 10.0),
            yield_: c.yield_pct,
        })
        .collect()
}

// ─── Scoring ────────────────────────────────────────────────────────

/// One ranked entity with its full breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub rank: usize,
    pub candidate: Candidate,
    pub raw: MetricSet<Option<f64>>,
    pub sub_scores: MetricSet<f64>,
    pub contributions: MetricSet<f64>,
    pub total: f64,
    /// Metrics with no raw value, scored 0.
    pub missing: Vec<Metric>,
}

impl ScoreRecord {
    pub fn missing_labels(&self) -> String {
        self.missing
            .iter()
            .map(|m| m.label())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Score and rank candidates. Weights are validated before anything else.
///
/// Sorted by total descending; ties broken by name, then key, ascending.
pub fn score_candidates(
    candidates: &[Candidate],
    weights: &ScoreWeights,
    normalization: Normalization,
) -> Result<Vec<ScoreRecord>, ScoreError> {
    weights.validate()?;

    let raws = raw_metrics(candidates, normalization);
    let mut normalized: BTreeMap<Metric, Vec<Option<f64>>> = BTreeMap::new();
    for metric in Metric::ALL {
        let column: Vec<Option<f64>> = raws.iter().map(|r| r.get(metric)).collect();
        normalized.insert(metric, normalization.apply(&column));
    }

    let mut records: Vec<ScoreRecord> = candidates
        .iter()
        .zip(&raws)
        .enumerate()
        .map(|(i, (candidate, raw))| {
            let mut sub_scores = MetricSet::<f64>::default();
            let mut contributions = MetricSet::<f64>::default();
            let mut missing = Vec::new();
            for metric in Metric::ALL {
                let score = match normalized[&metric][i] {
                    Some(s) => s,
                    None => {
                        missing.push(metric);
                        0.0
                    }
                };
                sub_scores.set(metric, score);
                contributions.set(metric, weights.get(metric) * score / 100.0);
            }
            let total = Metric::ALL.iter().map(|&m| contributions.get(m)).sum();
            ScoreRecord {
                rank: 0,
                candidate: candidate.clone(),
                raw: *raw,
                sub_scores,
                contributions,
                total,
                missing,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.name.cmp(&b.candidate.name))
            .then_with(|| a.candidate.key.cmp(&b.candidate.key))
    });
    for (i, r) in records.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    Ok(records)
}

// ─── Sensitivity ────────────────────────────────────────────────────

/// A candidate's rank under every named profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub key: String,
    pub name: String,
    /// In `WeightProfile::ALL` order.
    pub ranks: Vec<(WeightProfile, usize)>,
}

impl SensitivityRow {
    pub fn best_rank(&self) -> usize {
        self.ranks.iter().map(|r| r.1).min().unwrap_or(0)
    }

    pub fn worst_rank(&self) -> usize {
        self.ranks.iter().map(|r| r.1).max().unwrap_or(0)
    }

    pub fn rank_under(&self, profile: WeightProfile) -> Option<usize> {
        self.ranks.iter().find(|r| r.0 == profile).map(|r| r.1)
    }
}

/// Rank candidates under every profile.
///
/// Rows are ordered by their balanced-profile rank.
pub fn sensitivity(
    candidates: &[Candidate],
    normalization: Normalization,
) -> Result<Vec<SensitivityRow>, ScoreError> {
    let mut rows: BTreeMap<String, SensitivityRow> = BTreeMap::new();
    for profile in WeightProfile::ALL {
        for record in score_candidates(candidates, &profile.weights(), normalization)? {
            rows.entry(record.candidate.key.clone())
                .or_insert_with(|| SensitivityRow {
                    key: record.candidate.key.clone(),
                    name: record.candidate.name.clone(),
                    ranks: Vec::with_capacity(WeightProfile::ALL.len()),
                })
                .ranks
                .push((profile, record.rank));
        }
    }
    let mut rows: Vec<SensitivityRow> = rows.into_values().collect();
    rows.sort_by_key(|r| r.rank_under(WeightProfile::Balanced).unwrap_or(usize::MAX));
    Ok(rows)
}
