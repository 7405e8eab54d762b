//! Text-overlap scoring.
//!
//! [`Scorer`] is the seam between the aggregator and whatever computes the
//! similarity numbers. The crate ships [`RougeScorer`]; tests swap in fixed
//! scorers to exercise the averaging.

mod rouge;

pub use rouge::{RougeScorer, Tokenization};

use crate::error::{EvalError, EvalResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RougeType {
    /// Unigram overlap
    #[serde(rename = "rouge1")]
    Rouge1,
    /// Bigram overlap
    #[serde(rename = "rouge2")]
    Rouge2,
    /// Longest common subsequence over the whole text
    #[serde(rename = "rougeL")]
    RougeL,
    /// Union LCS over newline-separated sentences
    #[serde(rename = "rougeLsum")]
    RougeLsum,
}

impl RougeType {
    pub fn name(&self) -> &'static str {
        match self {
            RougeType::Rouge1 => "rouge1",
            RougeType::Rouge2 => "rouge2",
            RougeType::RougeL => "rougeL",
            RougeType::RougeLsum => "rougeLsum",
        }
    }
}

impl fmt::Display for RougeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precision, recall and their harmonic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Score {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

impl Score {
    pub const PERFECT: Score = Score {
        precision: 1.0,
        recall: 1.0,
        fmeasure: 1.0,
    };

    pub fn new(precision: f64, recall: f64) -> Self {
        let fmeasure = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            fmeasure,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Precision: {:.4}, Recall: {:.4}, F1: {:.4}",
            self.precision, self.recall, self.fmeasure
        )
    }
}

pub type Scores = BTreeMap<RougeType, Score>;

/// Running mean of scores, updated one pair at a time.
///
/// A batch of identical scores averages to exactly that score.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanScore {
    count: usize,
    mean: Score,
}

impl MeanScore {
    pub fn push(&mut self, score: Score) {
        self.count += 1;
        let k = self.count as f64;
        self.mean.precision += (score.precision - self.mean.precision) / k;
        self.mean.recall += (score.recall - self.mean.recall) / k;
        self.mean.fmeasure += (score.fmeasure - self.mean.fmeasure) / k;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Score {
        self.mean
    }
}

/// Scoring capability: per-pair scores plus a whole-batch aggregate.
pub trait Scorer: Send + Sync {
    /// Score one candidate against its reference
    fn score(&self, candidate: &str, reference: &str) -> Scores;

    /// Aggregate over aligned candidate/reference sequences
    fn score_batch(&self, candidates: &[String], references: &[String]) -> EvalResult<Scores> {
        check_aligned(candidates, references)?;

        let mut means: BTreeMap<RougeType, MeanScore> = BTreeMap::new();
        for (candidate, reference) in candidates.iter().zip(references) {
            for (metric, score) in self.score(candidate, reference) {
                means.entry(metric).or_default().push(score);
            }
        }
        Ok(means.into_iter().map(|(k, m)| (k, m.mean())).collect())
    }
}

/// Length of the batch, provided both sides agree and it is non-empty
pub(crate) fn check_aligned(candidates: &[String], references: &[String]) -> EvalResult<usize> {
    if candidates.len() != references.len() {
        return Err(EvalError::LengthMismatch {
            candidates: candidates.len(),
            references: references.len(),
        });
    }
    if candidates.is_empty() {
        return Err(EvalError::EmptyBatch);
    }
    Ok(candidates.len())
}
