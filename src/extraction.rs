use crate::data::{ExpressionTable, ResolvedGeneSet};
use crate::error::{DpsError, Result};
use crate::param::Param;
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Minimum number of reversed pairs a usable panel must reach.
pub const MIN_PANEL_SIZE: usize = 100;

/// An oriented gene pair: `low` reads below `high` in most negative samples
/// and the order flips in most positive samples. Indices refer to rows of the
/// expression table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenePair {
    pub low: usize,
    pub high: usize,
    pub reversal_ratio: f64,
    pub importance: f64,
}

/// Orient a candidate pair from the signed ratio of its two group fractions.
/// A negative sign means the order flips the other way, so the genes swap.
fn orient(a: usize, b: usize, signed_ratio: f64) -> GenePair {
    if signed_ratio >= 0.0 {
        GenePair {
            low: a,
            high: b,
            reversal_ratio: signed_ratio,
            importance: 0.0,
        }
    } else {
        GenePair {
            low: b,
            high: a,
            reversal_ratio: -signed_ratio,
            importance: 0.0,
        }
    }
}

/// Upper-triangular scan of all gene pairs. For each pair the fraction of
/// negative samples with gene a strictly below gene b is compared against the
/// same fraction in the positive samples; pairs whose absolute difference
/// exceeds `threshold` are kept. Genes are strictly compared, so ties count
/// as "not below" on both sides.
fn scan_pairs(
    expr: &ExpressionTable,
    neg_columns: &[usize],
    pos_columns: &[usize],
    threshold: f64,
    thread_number: usize,
) -> Vec<GenePair> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_number)
        .build()
        .unwrap();

    let neg_len = neg_columns.len() as f64;
    let pos_len = pos_columns.len() as f64;

    let per_gene: Vec<Vec<GenePair>> = pool.install(|| {
        (0..expr.gene_len)
            .into_par_iter()
            .map(|a| {
                let row_a = expr.row(a);
                let mut found = Vec::new();
                for b in (a + 1)..expr.gene_len {
                    let row_b = expr.row(b);
                    let mut neg_below = 0usize;
                    for &column in neg_columns {
                        if row_a[column] < row_b[column] {
                            neg_below += 1;
                        }
                    }
                    let mut pos_below = 0usize;
                    for &column in pos_columns {
                        if row_a[column] < row_b[column] {
                            pos_below += 1;
                        }
                    }
                    let signed_ratio =
                        neg_below as f64 / neg_len - pos_below as f64 / pos_len;
                    let pair = orient(a, b, signed_ratio);
                    if pair.reversal_ratio > threshold {
                        found.push(pair);
                    }
                }
                found
            })
            .collect()
    });

    // per-gene blocks are reassembled in gene order, so the panel is
    // independent of the thread count
    per_gene.into_iter().flatten().collect()
}

/// Greedy single-membership filter over the ratio-sorted panel: a pair is
/// kept only when neither of its genes already belongs to a kept pair.
fn deduplicate(panel: Vec<GenePair>) -> Vec<GenePair> {
    let mut taken: HashSet<usize> = HashSet::new();
    let mut kept = Vec::new();
    for pair in panel {
        if !taken.contains(&pair.low) && !taken.contains(&pair.high) {
            taken.insert(pair.low);
            taken.insert(pair.high);
            kept.push(pair);
        }
    }
    kept
}

/// Build the reversed gene-pair panel for the two sample groups.
///
/// The panel is sorted by decreasing reversal ratio (ties keep scan order)
/// and must reach [`MIN_PANEL_SIZE`] pairs before any gene-set restriction
/// or deduplication is applied.
pub fn extract(
    expr: &ExpressionTable,
    neg_columns: &[usize],
    pos_columns: &[usize],
    gene_set: Option<&ResolvedGeneSet>,
    param: &Param,
) -> Result<Vec<GenePair>> {
    let threshold = param.extraction.reversal_ratio_threshold;
    info!(
        "Scanning {} gene pairs across {} genes...",
        expr.gene_len * expr.gene_len.saturating_sub(1) / 2,
        expr.gene_len
    );

    let mut panel = scan_pairs(
        expr,
        neg_columns,
        pos_columns,
        threshold,
        param.general.thread_number,
    );
    panel.sort_by(|a, b| match b.reversal_ratio.partial_cmp(&a.reversal_ratio) {
        Some(ordering) => ordering,
        None => Ordering::Equal,
    });
    info!(
        "{} reversed gene pairs above threshold {:.3}",
        panel.len(),
        threshold
    );

    if panel.len() < MIN_PANEL_SIZE {
        return Err(DpsError::InsufficientPairs {
            found: panel.len(),
            required: MIN_PANEL_SIZE,
        });
    }

    if let Some(set) = gene_set {
        panel.retain(|pair| set.indices.contains(&pair.low) || set.indices.contains(&pair.high));
        info!(
            "{} pairs kept after restriction to gene set '{}'",
            panel.len(),
            set.name
        );
        if panel.is_empty() {
            return Err(DpsError::EmptyPanel {
                set: set.name.clone(),
            });
        }
    }

    if param.extraction.deduplicate {
        let before = panel.len();
        panel = deduplicate(panel);
        info!(
            "{} pairs sharing a gene removed, {} kept",
            before - panel.len(),
            panel.len()
        );
    }

    Ok(panel)
}
