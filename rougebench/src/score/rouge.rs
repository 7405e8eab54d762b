use super::{RougeType, Score, Scorer, Scores};
use std::collections::HashMap;

/// How text is split into tokens before overlap is counted. Neither mode stems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tokenization {
    /// Lowercase, split on whitespace; punctuation stays attached to words
    #[default]
    Whitespace,
    /// Lowercase, treat every character outside ASCII `[a-z0-9]` as a separator
    Alphanumeric,
}

impl Tokenization {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        match self {
            Tokenization::Whitespace => lower.split_whitespace().map(str::to_string).collect(),
            Tokenization::Alphanumeric => lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RougeScorer {
    metrics: Vec<RougeType>,
    tokenization: Tokenization,
}

impl RougeScorer {
    pub fn new(metrics: impl Into<Vec<RougeType>>, tokenization: Tokenization) -> Self {
        Self {
            metrics: metrics.into(),
            tokenization,
        }
    }

    /// rouge1/rouge2/rougeL on whitespace tokens, used for per-pair averaging
    pub fn per_pair() -> Self {
        Self::new(
            [RougeType::Rouge1, RougeType::Rouge2, RougeType::RougeL],
            Tokenization::Whitespace,
        )
    }

    /// All four metrics on alphanumeric tokens, used for the batch-level report
    pub fn batch() -> Self {
        Self::new(
            [
                RougeType::Rouge1,
                RougeType::Rouge2,
                RougeType::RougeL,
                RougeType::RougeLsum,
            ],
            Tokenization::Alphanumeric,
        )
    }

    fn sentences(&self, text: &str) -> Vec<Vec<String>> {
        text.split('\n')
            .map(|line| self.tokenization.tokenize(line))
            .filter(|tokens| !tokens.is_empty())
            .collect()
    }
}

impl Default for RougeScorer {
    fn default() -> Self {
        Self::per_pair()
    }
}

impl Scorer for RougeScorer {
    fn score(&self, candidate: &str, reference: &str) -> Scores {
        let cand = self.tokenization.tokenize(candidate);
        let refr = self.tokenization.tokenize(reference);

        self.metrics
            .iter()
            .map(|metric| {
                let score = match metric {
                    RougeType::Rouge1 => ngram_score(&cand, &refr, 1),
                    RougeType::Rouge2 => ngram_score(&cand, &refr, 2),
                    RougeType::RougeL => lcs_score(&cand, &refr),
                    RougeType::RougeLsum => {
                        summary_lcs_score(&self.sentences(candidate), &self.sentences(reference))
                    }
                };
                (*metric, score)
            })
            .collect()
    }
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

fn ratio(n: usize, d: usize) -> f64 {
    n as f64 / d.max(1) as f64
}

fn ngram_score(candidate: &[String], reference: &[String], n: usize) -> Score {
    let cand = ngram_counts(candidate, n);
    let refr = ngram_counts(reference, n);

    // Clipped overlap: a repeated n-gram only matches as often as the reference has it
    let overlap: usize = cand
        .iter()
        .map(|(gram, count)| (*count).min(refr.get(gram).copied().unwrap_or(0)))
        .sum();

    let cand_total: usize = cand.values().sum();
    let ref_total: usize = refr.values().sum();
    if cand_total == 0 && ref_total == 0 {
        // Both texts are shorter than n; identical ones still agree
        return if !candidate.is_empty() && candidate == reference {
            Score::PERFECT
        } else {
            Score::default()
        };
    }

    Score::new(ratio(overlap, cand_total), ratio(overlap, ref_total))
}

/// DP table where `t[i][j]` is the LCS length of `a[..i]` and `b[..j]`
fn lcs_table(a: &[String], b: &[String]) -> Vec<Vec<usize>> {
    let mut t = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            t[i][j] = if a[i - 1] == b[j - 1] {
                t[i - 1][j - 1] + 1
            } else {
                t[i - 1][j].max(t[i][j - 1])
            };
        }
    }
    t
}

fn lcs_score(candidate: &[String], reference: &[String]) -> Score {
    if candidate.is_empty() || reference.is_empty() {
        return Score::default();
    }
    let lcs = lcs_table(reference, candidate)[reference.len()][candidate.len()];
    Score::new(ratio(lcs, candidate.len()), ratio(lcs, reference.len()))
}

/// Indices into `reference` of one longest common subsequence with `candidate`
fn lcs_indices(reference: &[String], candidate: &[String]) -> Vec<usize> {
    let t = lcs_table(reference, candidate);
    let (mut i, mut j) = (reference.len(), candidate.len());
    let mut indices = Vec::with_capacity(t[i][j]);
    while i > 0 && j > 0 {
        if reference[i - 1] == candidate[j - 1] {
            indices.push(i - 1);
            i -= 1;
            j -= 1;
        } else if t[i][j - 1] > t[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }
    indices.reverse();
    indices
}

fn summary_lcs_score(candidate: &[Vec<String>], reference: &[Vec<String>]) -> Score {
    let m: usize = reference.iter().map(Vec::len).sum();
    let n: usize = candidate.iter().map(Vec::len).sum();
    if m == 0 || n == 0 {
        return Score::default();
    }

    let mut ref_budget: HashMap<&str, usize> = HashMap::new();
    for token in reference.iter().flatten() {
        *ref_budget.entry(token.as_str()).or_insert(0) += 1;
    }
    let mut cand_budget: HashMap<&str, usize> = HashMap::new();
    for token in candidate.iter().flatten() {
        *cand_budget.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut hits = 0usize;
    for sentence in reference {
        let mut matched: Vec<usize> = candidate
            .iter()
            .flat_map(|c| lcs_indices(sentence, c))
            .collect();
        matched.sort_unstable();
        matched.dedup();

        for token in matched.into_iter().map(|idx| sentence[idx].as_str()) {
            if let (Some(c), Some(r)) = (cand_budget.get_mut(token), ref_budget.get_mut(token))
                && *c > 0
                && *r > 0
            {
                *c -= 1;
                *r -= 1;
                hits += 1;
            }
        }
    }

    Score::new(ratio(hits, n), ratio(hits, m))
}
