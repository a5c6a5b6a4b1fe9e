pub mod analysis;
pub mod correlation;
pub mod data;
pub mod error;
pub mod extraction;
pub mod importance;
pub mod param;
pub mod scoring;
pub mod utils;

use crate::analysis::{Analysis, PairRecord};
use crate::data::{ExpressionTable, GeneSet, SampleTable};
use crate::error::Result;
use crate::param::Param;
use chrono::Local;
use log::{debug, info};

/// Run the whole scoring pipeline described by `param` and return the run
/// record. Nothing is written to disk here; the caller decides what to do
/// with the tables.
pub fn run(param: &Param) -> Result<Analysis> {
    let start = std::time::Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    param::validate(param)?;

    // Load input tables
    let expr = ExpressionTable::load(&param.data.expression)?;
    let samples = SampleTable::load(&param.data.sample_info)?;
    debug!("{:?}", expr);
    debug!("{:?}", samples);

    let neg_columns = data::group_columns(&expr, &samples, &param.data.negative_class)?;
    let pos_columns = data::group_columns(&expr, &samples, &param.data.positive_class)?;
    info!(
        "Comparing {} '{}' samples against {} '{}' samples",
        neg_columns.len(),
        param.data.negative_class,
        pos_columns.len(),
        param.data.positive_class
    );

    let gene_set = if param.data.gene_set.is_empty() {
        None
    } else {
        Some(GeneSet::load(&param.data.gene_set)?.resolve(&expr)?)
    };

    // Build the panel, score every sample, rank the panel
    let panel = extraction::extract(&expr, &neg_columns, &pos_columns, gene_set.as_ref(), param)?;
    let (scored, diff) = scoring::score(&panel, &expr, &samples, param);
    let panel = importance::importance(panel, &diff, &scored, &expr);

    let correlation = correlation::correlate(&scored, &samples.covariate_names, param)?;

    let pairs: Vec<PairRecord> = panel
        .iter()
        .map(|pair| PairRecord {
            gene1: expr.genes[pair.low].clone(),
            gene2: expr.genes[pair.high].clone(),
            reversal_ratio: pair.reversal_ratio,
            importance_score: pair.importance,
        })
        .collect();

    let dpscore_version = format!(
        "{}#{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("DPSCORE_GIT_SHA").unwrap_or("unknown")
    );
    let prefix = std::path::Path::new(&param.general.save_run)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("dps")
        .to_string();
    let exec_time = start.elapsed().as_secs_f64();

    Ok(Analysis {
        id: format!("{}_{}", prefix, timestamp),
        timestamp,
        dpscore_version,
        parameters: param.clone(),
        pairs,
        scores: scored,
        covariate_names: samples.covariate_names.clone(),
        correlation,
        execution_time: exec_time,
    })
}
