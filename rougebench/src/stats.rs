use serde::Serialize;
use std::fmt;

/// Order statistics of a sample, as reported next to the averaged scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quantiles {
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
    pub avg: f64,
}

impl Quantiles {
    /// Nearest-rank quantiles; all zeros for an empty sample
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let len = sorted.len();
        Self {
            min: sorted[0],
            p25: sorted[len * 25 / 100],
            p50: sorted[len * 50 / 100],
            p75: sorted[len * 75 / 100],
            p90: sorted[len * 90 / 100],
            p99: sorted[(len * 99 / 100).min(len - 1)],
            max: sorted[len - 1],
            avg: values.iter().sum::<f64>() / len as f64,
        }
    }
}

impl fmt::Display for Quantiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={:.4} p25={:.4} p50={:.4} p75={:.4} p90={:.4} p99={:.4} max={:.4}",
            self.min, self.p25, self.p50, self.p75, self.p90, self.p99, self.max
        )
    }
}
