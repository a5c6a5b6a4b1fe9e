use crate::data::{ExpressionTable, SampleTable};
use crate::extraction::GenePair;
use crate::param::Param;
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashSet;

/// Per-pair expression differences, dense and row-major, one row per panel
/// pair and one column per expression-table sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffMatrix {
    pub values: Vec<f64>,
    pub pair_len: usize,
    pub sample_len: usize,
}

impl DiffMatrix {
    #[inline]
    pub fn row(&self, pair: usize) -> &[f64] {
        &self.values[pair * self.sample_len..(pair + 1) * self.sample_len]
    }
}

/// A sample-info row annotated with its perturbation score and outlier flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoredSample {
    pub sample: String,
    pub class: String,
    pub rank: u32,
    pub covariates: Vec<String>,
    pub dp_score: f64,
    pub outlier: bool,
}

/// Score every sample of the expression table against the panel.
///
/// The perturbation score of a sample is the fraction of panel pairs whose
/// low gene does not read below the high gene in that sample. Scores are
/// joined onto the sample-info rows (samples present on only one side are
/// dropped), sorted ascending and flagged for rank outliers. The panel must
/// not be empty; the extractor guarantees that.
pub fn score(
    panel: &[GenePair],
    expr: &ExpressionTable,
    table: &SampleTable,
    param: &Param,
) -> (Vec<ScoredSample>, DiffMatrix) {
    debug_assert!(!panel.is_empty());
    info!(
        "Scoring {} samples against {} gene pairs...",
        expr.sample_len,
        panel.len()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .unwrap();

    let rows: Vec<Vec<f64>> = pool.install(|| {
        panel
            .par_iter()
            .map(|pair| {
                let low = expr.row(pair.low);
                let high = expr.row(pair.high);
                low.iter().zip(high.iter()).map(|(l, h)| l - h).collect()
            })
            .collect()
    });

    let mut counts = vec![0usize; expr.sample_len];
    let mut values = Vec::with_capacity(panel.len() * expr.sample_len);
    for row in rows {
        for (column, value) in row.iter().enumerate() {
            if *value >= 0.0 {
                counts[column] += 1;
            }
        }
        values.extend(row);
    }
    let diff = DiffMatrix {
        values,
        pair_len: panel.len(),
        sample_len: expr.sample_len,
    };

    let scores: Vec<f64> = counts
        .iter()
        .map(|count| *count as f64 / panel.len() as f64)
        .collect();

    // inner join onto the sample-info rows
    let columns = expr.column_map();
    let mut scored = Vec::new();
    let mut dropped_info = 0usize;
    for record in &table.records {
        match columns.get(record.sample.as_str()) {
            Some(&column) => scored.push(ScoredSample {
                sample: record.sample.clone(),
                class: record.class.clone(),
                rank: record.rank,
                covariates: record.covariates.clone(),
                dp_score: scores[column],
                outlier: false,
            }),
            None => dropped_info += 1,
        }
    }
    if dropped_info > 0 {
        warn!(
            "{} sample-info rows have no expression column and were not scored",
            dropped_info
        );
    }
    let known: HashSet<&str> = table.records.iter().map(|r| r.sample.as_str()).collect();
    let dropped_expr = expr
        .samples
        .iter()
        .filter(|sample| !known.contains(sample.as_str()))
        .count();
    if dropped_expr > 0 {
        warn!(
            "{} expression columns have no sample-info row and were not scored",
            dropped_expr
        );
    }

    scored.sort_by(|a, b| match a.dp_score.partial_cmp(&b.dp_score) {
        Some(ordering) => ordering,
        None => Ordering::Equal,
    });
    mark_outliers(&mut scored);

    (scored, diff)
}

/// Flag samples whose rank disagrees with their position in the score-sorted
/// sequence. The sequence is cut into contiguous blocks sized by the number
/// of samples at each rank, ranks ascending; a sample is an outlier when it
/// sits in a block owned by another rank.
fn mark_outliers(scored: &mut [ScoredSample]) {
    let mut rank_counts: BTreeMap<u32, usize> = BTreeMap::new();
    for sample in scored.iter() {
        *rank_counts.entry(sample.rank).or_insert(0) += 1;
    }

    let mut start = 0usize;
    for (rank, count) in rank_counts {
        for sample in scored[start..start + count].iter_mut() {
            sample.outlier = sample.rank != rank;
        }
        start += count;
    }
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleRecord;
    use std::collections::HashMap;

    fn small_expr(samples: &[&str], genes: &[&str], values: Vec<f64>) -> ExpressionTable {
        let genes: Vec<String> = genes.iter().map(|s| s.to_string()).collect();
        let gene_index: HashMap<String, usize> =
            genes.iter().enumerate().map(|(i, s)| (s.clone(), i)).collect();
        ExpressionTable {
            gene_len: genes.len(),
            sample_len: samples.len(),
            genes,
            samples: samples.iter().map(|s| s.to_string()).collect(),
            values,
            gene_index,
        }
    }

    fn record(sample: &str, class: &str, rank: u32) -> SampleRecord {
        SampleRecord {
            sample: sample.to_string(),
            class: class.to_string(),
            rank,
            covariates: Vec::new(),
        }
    }

    fn pair(low: usize, high: usize) -> GenePair {
        GenePair {
            low,
            high,
            reversal_ratio: 1.0,
            importance: 0.0,
        }
    }

    #[test]
    fn test_score_hand_computed() {
        let expr = small_expr(
            &["s0", "s1", "s2", "s3"],
            &["A", "B", "C"],
            vec![
                5.0, 1.0, 4.0, 4.0, // A
                3.0, 3.0, 4.0, 9.0, // B
                9.0, 0.0, 5.0, 1.0, // C
            ],
        );
        let table = SampleTable {
            records: vec![
                record("s0", "ND", 0),
                record("s1", "ND", 0),
                record("s2", "T2D", 1),
                record("s3", "T2D", 1),
            ],
            covariate_names: Vec::new(),
        };
        let panel = vec![pair(0, 1), pair(2, 0)];

        let (scored, diff) = score(&panel, &expr, &table, &Param::default());

        // diff rows are low minus high over all samples
        assert_eq!(diff.pair_len, 2);
        assert_eq!(diff.row(0), &[2.0, -2.0, 0.0, -5.0]);
        assert_eq!(diff.row(1), &[4.0, -1.0, 1.0, -3.0]);

        // s0: both diffs >= 0; s2: 0.0 counts as >= 0 in both rows
        let by_name: HashMap<&str, f64> = scored
            .iter()
            .map(|s| (s.sample.as_str(), s.dp_score))
            .collect();
        assert_eq!(by_name["s0"], 1.0);
        assert_eq!(by_name["s1"], 0.0);
        assert_eq!(by_name["s2"], 1.0);
        assert_eq!(by_name["s3"], 0.0);

        // ascending and stable: equals keep the sample-info row order
        let order: Vec<&str> = scored.iter().map(|s| s.sample.as_str()).collect();
        assert_eq!(order, vec!["s1", "s3", "s0", "s2"]);
        for sample in &scored {
            assert!((0.0..=1.0).contains(&sample.dp_score));
        }
    }

    #[test]
    fn test_score_drops_unmatched_samples() {
        let expr = small_expr(
            &["s0", "s1", "extra"],
            &["A", "B"],
            vec![
                5.0, 1.0, 2.0, // A
                3.0, 3.0, 1.0, // B
            ],
        );
        let table = SampleTable {
            records: vec![
                record("s0", "ND", 0),
                record("s1", "T2D", 1),
                record("ghost", "T2D", 1),
            ],
            covariate_names: Vec::new(),
        };
        let panel = vec![pair(0, 1)];

        let (scored, diff) = score(&panel, &expr, &table, &Param::default());
        assert_eq!(
            scored.len(),
            2,
            "ghost has no expression column and extra has no metadata"
        );
        assert!(scored.iter().all(|s| s.sample != "ghost"));
        assert_eq!(
            diff.sample_len, 3,
            "the diff matrix still spans every expression column"
        );
    }

    #[test]
    fn test_mark_outliers_positional_blocks() {
        let mut scored: Vec<ScoredSample> = [("a", 0), ("b", 1), ("c", 0), ("d", 1)]
            .iter()
            .map(|(name, rank)| ScoredSample {
                sample: name.to_string(),
                class: "x".to_string(),
                rank: *rank,
                covariates: Vec::new(),
                dp_score: 0.0,
                outlier: false,
            })
            .collect();

        mark_outliers(&mut scored);
        let flags: Vec<bool> = scored.iter().map(|s| s.outlier).collect();
        // the first two positions belong to rank 0, the last two to rank 1
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn test_mark_outliers_clean_separation() {
        let mut scored: Vec<ScoredSample> = [("a", 0), ("b", 0), ("c", 1)]
            .iter()
            .map(|(name, rank)| ScoredSample {
                sample: name.to_string(),
                class: "x".to_string(),
                rank: *rank,
                covariates: Vec::new(),
                dp_score: 0.0,
                outlier: true,
            })
            .collect();

        mark_outliers(&mut scored);
        assert!(
            scored.iter().all(|s| !s.outlier),
            "ranks already in block order should clear every flag"
        );
    }
}
