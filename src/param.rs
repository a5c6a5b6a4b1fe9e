use crate::error::{DpsError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub correlation: Correlation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    /// 0 lets the thread pool size itself on the available cores
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    /// when set, logs go to files named <log_base>_<timestamp>.<log_suffix>
    #[serde(default = "empty_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "output_dir_default")]
    pub output_dir: String,
    /// when set, the whole run record is saved to this path (.json or .bin)
    #[serde(default = "empty_default")]
    pub save_run: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_default")]
    pub expression: String,
    #[serde(default = "empty_default")]
    pub sample_info: String,
    /// optional one-column CSV restricting the panel to listed genes
    #[serde(default = "empty_default")]
    pub gene_set: String,
    #[serde(default = "empty_default")]
    pub negative_class: String,
    #[serde(default = "empty_default")]
    pub positive_class: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Extraction {
    #[serde(default = "half_default")]
    pub reversal_ratio_threshold: f64,
    #[serde(default = "false_default")]
    pub deduplicate: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Correlation {
    /// covariate column of the sample-info table to analyse
    #[serde(default = "empty_default")]
    pub covariate: String,
    /// class whose scored samples enter the analysis
    #[serde(default = "empty_default")]
    pub class: String,
    /// "discrete" or "continuous"
    #[serde(default = "empty_default")]
    pub data_type: String,
}

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Extraction {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Correlation {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        Param {
            general: General::default(),
            data: Data::default(),
            extraction: Extraction::default(),
            correlation: Correlation::default(),
        }
    }
}

pub fn get(param_file: String) -> Result<Param> {
    let param_file_reader = File::open(&param_file).map_err(|e| DpsError::io(&param_file, e))?;
    let param_reader = BufReader::new(param_file_reader);

    let config: Param = serde_yaml::from_reader(param_reader)
        .map_err(|e| DpsError::Parameter(format!("cannot parse {}: {}", param_file, e)))?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(param: &Param) -> Result<()> {
    if param.data.expression.is_empty() {
        return Err(DpsError::Parameter(
            "data.expression is required".to_string(),
        ));
    }
    if param.data.sample_info.is_empty() {
        return Err(DpsError::Parameter(
            "data.sample_info is required".to_string(),
        ));
    }
    if param.data.negative_class.is_empty() || param.data.positive_class.is_empty() {
        return Err(DpsError::Parameter(
            "both data.negative_class and data.positive_class are required".to_string(),
        ));
    }
    if param.data.negative_class == param.data.positive_class {
        return Err(DpsError::Parameter(format!(
            "negative_class and positive_class are both '{}'; they must differ",
            param.data.negative_class
        )));
    }

    let threshold = param.extraction.reversal_ratio_threshold;
    if !(0.3..=1.0).contains(&threshold) {
        return Err(DpsError::Parameter(format!(
            "Invalid reversal_ratio_threshold={:.3}. Must be in range [0.3, 1].",
            threshold
        )));
    }

    if param.general.output_dir.is_empty() {
        return Err(DpsError::Parameter(
            "general.output_dir must not be empty".to_string(),
        ));
    }

    validate_correlation(param)?;
    Ok(())
}

fn validate_correlation(param: &Param) -> Result<()> {
    let set = [
        &param.correlation.covariate,
        &param.correlation.class,
        &param.correlation.data_type,
    ];
    let supplied = set.iter().filter(|v| !v.is_empty()).count();

    if supplied == 0 {
        return Ok(());
    }
    if supplied < set.len() {
        return Err(DpsError::Parameter(
            "correlation requires covariate, class and data_type to be set together".to_string(),
        ));
    }

    match param.correlation.data_type.to_lowercase().as_str() {
        "discrete" | "continuous" => Ok(()),
        other => Err(DpsError::Parameter(format!(
            "Invalid correlation data_type '{}'. Must be 'discrete' or 'continuous'.",
            other
        ))),
    }
}

fn one_default() -> usize {
    1
}

fn half_default() -> f64 {
    0.5
}

fn false_default() -> bool {
    false
}

fn empty_default() -> String {
    "".to_string()
}

fn log_level_default() -> String {
    "info".to_string()
}

fn log_suffix_default() -> String {
    "log".to_string()
}

fn output_dir_default() -> String {
    "dps_output".to_string()
}
