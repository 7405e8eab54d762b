//! Batch-wide ROUGE aggregation.
//!
//! Two reports are produced side by side: the per-pair scores averaged over
//! the batch, and whatever the batch scorer computes over the whole
//! sequences at once. They are not reconciled; tokenization differs between
//! the default scorers, so small gaps between them are expected.

use crate::error::EvalResult;
use crate::score::{MeanScore, RougeScorer, RougeType, Score, Scorer, Scores, check_aligned};
use crate::stats::Quantiles;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Metrics averaged pair by pair
pub const PAIR_METRICS: [RougeType; 3] = [RougeType::Rouge1, RougeType::Rouge2, RougeType::RougeL];

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    /// Number of candidate/reference pairs
    pub count: usize,
    /// Per-pair scores averaged over the batch
    pub averages: Scores,
    /// Batch-level scores from the batch scorer
    pub batch: Scores,
    /// Distribution of per-pair F-measures
    pub fmeasure_spread: BTreeMap<RougeType, Quantiles>,
}

impl ScoreReport {
    pub fn average(&self, metric: RougeType) -> Option<Score> {
        self.averages.get(&metric).copied()
    }
}

/// Aggregate with the default scorers: whitespace tokens per pair,
/// alphanumeric tokens (plus rougeLsum) for the batch-level report.
pub fn aggregate(candidates: &[String], references: &[String]) -> EvalResult<ScoreReport> {
    aggregate_with(
        candidates,
        references,
        &RougeScorer::per_pair(),
        &RougeScorer::batch(),
    )
}

pub fn aggregate_with(
    candidates: &[String],
    references: &[String],
    pair_scorer: &dyn Scorer,
    batch_scorer: &dyn Scorer,
) -> EvalResult<ScoreReport> {
    let count = check_aligned(candidates, references)?;

    let batch = batch_scorer.score_batch(candidates, references)?;

    let mut means: BTreeMap<RougeType, MeanScore> = BTreeMap::new();
    let mut fmeasures: BTreeMap<RougeType, Vec<f64>> = BTreeMap::new();
    for (candidate, reference) in candidates.iter().zip(references) {
        let scores = pair_scorer.score(candidate, reference);
        for metric in PAIR_METRICS {
            let score = scores.get(&metric).copied().unwrap_or_default();
            means.entry(metric).or_default().push(score);
            fmeasures
                .entry(metric)
                .or_insert_with(|| Vec::with_capacity(count))
                .push(score.fmeasure);
        }
    }

    let averages: Scores = means.into_iter().map(|(k, m)| (k, m.mean())).collect();
    let fmeasure_spread = fmeasures
        .into_iter()
        .map(|(k, v)| (k, Quantiles::compute(&v)))
        .collect();

    tracing::debug!(count, ?averages, "Aggregated ROUGE scores");

    Ok(ScoreReport {
        count,
        averages,
        batch,
        fmeasure_spread,
    })
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Average ROUGE scores (n={}):", self.count)?;
        for (metric, score) in &self.averages {
            writeln!(f, "{metric}: {score}")?;
        }

        writeln!(f, "\nBatch-level ROUGE scores:")?;
        for (metric, score) in &self.batch {
            writeln!(f, "{metric}: {score}")?;
        }

        writeln!(f, "\nPer-pair F1 spread:")?;
        for (metric, spread) in &self.fmeasure_spread {
            writeln!(f, "{metric}: {spread}")?;
        }
        Ok(())
    }
}
