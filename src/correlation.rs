use crate::error::{DpsError, Result};
use crate::param::Param;
use crate::scoring::ScoredSample;
use crate::utils::{mean_and_std, median, rank_with_ties};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeMap;

/// Score distribution of one covariate level.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LevelSummary {
    pub level: String,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
}

/// Outcome of the covariate analysis for one class.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum CorrelationReport {
    Discrete {
        covariate: String,
        class: String,
        levels: Vec<LevelSummary>,
    },
    Continuous {
        covariate: String,
        class: String,
        n: usize,
        rho: f64,
        p_value: f64,
    },
}

/// Relate the perturbation scores of one class to a sample covariate.
/// Returns `None` when no covariate analysis was requested.
pub fn correlate(
    scored: &[ScoredSample],
    covariate_names: &[String],
    param: &Param,
) -> Result<Option<CorrelationReport>> {
    let request = &param.correlation;
    if request.covariate.is_empty() && request.class.is_empty() && request.data_type.is_empty() {
        return Ok(None);
    }

    let position = covariate_names
        .iter()
        .position(|name| name == &request.covariate)
        .ok_or_else(|| {
            DpsError::Schema(format!(
                "covariate column '{}' not found in the sample info",
                request.covariate
            ))
        })?;

    let selected: Vec<&ScoredSample> = scored
        .iter()
        .filter(|sample| sample.class == request.class)
        .collect();
    if selected.is_empty() {
        return Err(DpsError::InvalidCategory {
            label: request.class.clone(),
        });
    }
    info!(
        "Relating '{}' to the scores of {} '{}' samples...",
        request.covariate,
        selected.len(),
        request.class
    );

    match request.data_type.to_lowercase().as_str() {
        "discrete" => Ok(Some(summarize_levels(&selected, position, request))),
        "continuous" => continuous_report(&selected, position, request).map(Some),
        other => Err(DpsError::Parameter(format!(
            "Invalid correlation data_type '{}'. Must be 'discrete' or 'continuous'.",
            other
        ))),
    }
}

/// Group scores by covariate level (levels sorted alphabetically) and
/// summarize each group. Samples without a value for the covariate are
/// left out.
fn summarize_levels(
    selected: &[&ScoredSample],
    position: usize,
    request: &crate::param::Correlation,
) -> CorrelationReport {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut skipped = 0usize;
    for sample in selected {
        let level = &sample.covariates[position];
        if level.is_empty() {
            skipped += 1;
            continue;
        }
        groups.entry(level.clone()).or_default().push(sample.dp_score);
    }
    if skipped > 0 {
        warn!(
            "{} samples without a '{}' value were left out of the analysis",
            skipped, request.covariate
        );
    }

    let levels = groups
        .into_iter()
        .map(|(level, values)| {
            let (mean, sd) = mean_and_std(&values);
            LevelSummary {
                level,
                n: values.len(),
                mean,
                sd,
                median: median(&values),
            }
        })
        .collect();

    CorrelationReport::Discrete {
        covariate: request.covariate.clone(),
        class: request.class.clone(),
        levels,
    }
}

fn continuous_report(
    selected: &[&ScoredSample],
    position: usize,
    request: &crate::param::Correlation,
) -> Result<CorrelationReport> {
    let mut scores = Vec::with_capacity(selected.len());
    let mut values = Vec::with_capacity(selected.len());
    for sample in selected {
        let cell = &sample.covariates[position];
        let value: f64 = cell.parse().map_err(|_| {
            DpsError::Schema(format!(
                "covariate '{}' value '{}' for sample '{}' is not numeric",
                request.covariate, cell, sample.sample
            ))
        })?;
        values.push(value);
        scores.push(sample.dp_score);
    }

    let (rho, p_value) = spearman(&scores, &values);
    Ok(CorrelationReport::Continuous {
        covariate: request.covariate.clone(),
        class: request.class.clone(),
        n: selected.len(),
        rho,
        p_value,
    })
}

/// Spearman rank correlation with midrank tie handling. The p-value comes
/// from the usual t approximation with n-2 degrees of freedom; a perfect
/// correlation or fewer than 3 observations reports p = 0, constant input
/// leaves both values undefined.
pub fn spearman(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len() as f64;
    let rank_x = rank_with_ties(x);
    let rank_y = rank_with_ties(y);

    let mean_x = rank_x.iter().sum::<f64>() / n;
    let mean_y = rank_y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in rank_x.iter().zip(rank_y.iter()) {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        warn!("constant input leaves the rank correlation undefined");
        return (f64::NAN, f64::NAN);
    }
    let rho = cov / (var_x.sqrt() * var_y.sqrt());

    let df = n - 2.0;
    if df <= 0.0 || (1.0 - rho * rho) < f64::EPSILON {
        return (rho, 0.0);
    }
    let t_stat = rho * (df / (1.0 - rho * rho)).sqrt();
    let t_dist = StudentsT::new(0.0, 1.0, df).unwrap();
    let p_value = 2.0 * (1.0 - t_dist.cdf(t_stat.abs()));
    (rho, p_value)
}
