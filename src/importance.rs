use crate::data::ExpressionTable;
use crate::extraction::GenePair;
use crate::scoring::{DiffMatrix, ScoredSample};
use log::info;
use std::cmp::Ordering;

/// Attach an importance score to every panel pair and re-sort the panel by
/// it, descending (stable, ties keep the prior order).
///
/// Importance counts the scored samples that behave as their rank predicts
/// on the pair: rank-0 samples count when the pair holds its negative order
/// (diff < 0), every other scored sample counts when it reverses
/// (diff >= 0). The denominator is the full expression-table sample count,
/// so columns dropped at the join lower all importances equally.
pub fn importance(
    mut panel: Vec<GenePair>,
    diff: &DiffMatrix,
    scored: &[ScoredSample],
    expr: &ExpressionTable,
) -> Vec<GenePair> {
    debug_assert_eq!(panel.len(), diff.pair_len);

    let columns = expr.column_map();
    let mut anchor_columns = Vec::new();
    let mut rest_columns = Vec::new();
    for sample in scored {
        if let Some(&column) = columns.get(sample.sample.as_str()) {
            if sample.rank == 0 {
                anchor_columns.push(column);
            } else {
                rest_columns.push(column);
            }
        }
    }

    let total = expr.sample_len as f64;
    for (i, pair) in panel.iter_mut().enumerate() {
        let row = diff.row(i);
        let count_a = anchor_columns.iter().filter(|&&c| row[c] < 0.0).count();
        let count_b = rest_columns.iter().filter(|&&c| row[c] >= 0.0).count();
        pair.importance = (count_a + count_b) as f64 / total;
    }

    panel.sort_by(|a, b| match b.importance.partial_cmp(&a.importance) {
        Some(ordering) => ordering,
        None => Ordering::Equal,
    });

    info!("Importance computed for {} pairs", panel.len());
    panel
}
