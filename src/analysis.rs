use crate::correlation::CorrelationReport;
use crate::error::{DpsError, Result};
use crate::param::Param;
use crate::scoring::ScoredSample;
use crate::utils::mean_and_std;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

/// An exported panel pair, carrying gene symbols instead of row indices.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PairRecord {
    pub gene1: String,
    pub gene2: String,
    pub reversal_ratio: f64,
    pub importance_score: f64,
}

/// Everything one run produced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    /// Analysis ID, i.e., run prefix and timestamp
    pub id: String,
    /// Timestamp of the analysis
    pub timestamp: String,
    /// dpscore version and git hash used
    pub dpscore_version: String,
    /// Parameters used
    pub parameters: Param,
    /// The gene-pair panel, sorted by descending importance
    pub pairs: Vec<PairRecord>,
    /// Scored samples, sorted by ascending perturbation score
    pub scores: Vec<ScoredSample>,
    /// Covariate column names backing ScoredSample.covariates
    pub covariate_names: Vec<String>,
    /// If requested, the covariate analysis outcome
    pub correlation: Option<CorrelationReport>,
    /// Execution time in seconds
    pub execution_time: f64,
}

fn table_error<P: AsRef<Path>>(path: P, err: csv::Error) -> DpsError {
    DpsError::io(path.as_ref(), io::Error::new(io::ErrorKind::Other, err))
}

impl Analysis {
    /// Write the output tables into `dir`, creating it if needed:
    /// `Gene_pairs_table.csv`, `DP_score_table.csv` and, when a covariate
    /// analysis ran, `Correlation_table.csv`.
    pub fn write_tables(&self, dir: &str) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| DpsError::io(dir, e))?;

        let pairs_path = Path::new(dir).join("Gene_pairs_table.csv");
        let file = File::create(&pairs_path).map_err(|e| DpsError::io(&pairs_path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["Gene1", "Gene2", "ReversalRatio", "ImportanceScore"])
            .map_err(|e| table_error(&pairs_path, e))?;
        for pair in &self.pairs {
            writer
                .write_record([
                    pair.gene1.as_str(),
                    pair.gene2.as_str(),
                    &pair.reversal_ratio.to_string(),
                    &pair.importance_score.to_string(),
                ])
                .map_err(|e| table_error(&pairs_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| DpsError::io(&pairs_path, e))?;

        let scores_path = Path::new(dir).join("DP_score_table.csv");
        let file = File::create(&scores_path).map_err(|e| DpsError::io(&scores_path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        let mut header = vec!["Sample".to_string(), "Class".to_string(), "Rank".to_string()];
        header.extend(self.covariate_names.iter().cloned());
        header.push("DP_Score".to_string());
        header.push("Outlier".to_string());
        writer
            .write_record(&header)
            .map_err(|e| table_error(&scores_path, e))?;
        for sample in &self.scores {
            let mut row = vec![
                sample.sample.clone(),
                sample.class.clone(),
                sample.rank.to_string(),
            ];
            row.extend(sample.covariates.iter().cloned());
            row.push(sample.dp_score.to_string());
            row.push(if sample.outlier { "Yes" } else { "No" }.to_string());
            writer
                .write_record(&row)
                .map_err(|e| table_error(&scores_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| DpsError::io(&scores_path, e))?;

        if let Some(report) = &self.correlation {
            let corr_path = Path::new(dir).join("Correlation_table.csv");
            let file = File::create(&corr_path).map_err(|e| DpsError::io(&corr_path, e))?;
            let mut writer = csv::Writer::from_writer(file);
            match report {
                CorrelationReport::Discrete {
                    covariate,
                    class,
                    levels,
                } => {
                    writer
                        .write_record(["Class", "Covariate", "Level", "N", "Mean", "SD", "Median"])
                        .map_err(|e| table_error(&corr_path, e))?;
                    for level in levels {
                        writer
                            .write_record([
                                class.as_str(),
                                covariate.as_str(),
                                level.level.as_str(),
                                &level.n.to_string(),
                                &level.mean.to_string(),
                                &level.sd.to_string(),
                                &level.median.to_string(),
                            ])
                            .map_err(|e| table_error(&corr_path, e))?;
                    }
                }
                CorrelationReport::Continuous {
                    covariate,
                    class,
                    n,
                    rho,
                    p_value,
                } => {
                    writer
                        .write_record(["Class", "Covariate", "N", "SpearmanRho", "PValue"])
                        .map_err(|e| table_error(&corr_path, e))?;
                    writer
                        .write_record([
                            class.as_str(),
                            covariate.as_str(),
                            &n.to_string(),
                            &rho.to_string(),
                            &p_value.to_string(),
                        ])
                        .map_err(|e| table_error(&corr_path, e))?;
                }
            }
            writer.flush().map_err(|e| DpsError::io(&corr_path, e))?;
        }

        Ok(())
    }

    /// Saves the analysis to a file, picking the format from the extension
    /// (.json or .bin); anything else falls back to JSON.
    pub fn save_auto<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => self.save_json(path),
            "bin" | "bincode" => self.save_bincode(path),
            _ => {
                warn!("Unknown format. Saving analysis as JSON.");
                let json_path = path.with_extension("json");
                self.save_json(json_path)
            }
        }
    }

    /// Saves to JSON (human readable, but may have slight inaccuracies for decimal values)
    fn save_json<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Saves as Bincode (compact binary, Rust-only)
    fn save_bincode<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let encoded = bincode::serialize(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    /// Loads an analysis from a file, automatically detecting the format
    /// based on the file extension.
    pub fn load_auto<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::load_json(path),
            "bin" | "bincode" => Self::load_bincode(path),
            _ => Self::load_with_fallback(path),
        }
    }

    /// Loads from JSON format
    fn load_json<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let analysis: Analysis = serde_json::from_str(&content)?;
        Ok(analysis)
    }

    /// Loads from Bincode format
    fn load_bincode<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        let analysis: Analysis = bincode::deserialize(&bytes)?;
        Ok(analysis)
    }

    /// Tries Bincode first, then JSON.
    fn load_with_fallback<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();

        if let Ok(analysis) = Self::load_bincode(path) {
            return Ok(analysis);
        }

        if let Ok(analysis) = Self::load_json(path) {
            return Ok(analysis);
        }

        Err("Unable to load the analysis".into())
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Analysis {} ({} gene pairs, {} samples scored, {:.2}s)",
            self.id,
            self.pairs.len(),
            self.scores.len(),
            self.execution_time
        )?;

        writeln!(f, "Top pairs:")?;
        for pair in self.pairs.iter().take(10) {
            writeln!(
                f,
                "{:<12} < {:<12} reversal={:.3} importance={:.3}",
                pair.gene1, pair.gene2, pair.reversal_ratio, pair.importance_score
            )?;
        }

        let mut classes: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for sample in &self.scores {
            classes
                .entry(sample.class.as_str())
                .or_default()
                .push(sample.dp_score);
        }
        for (class, values) in classes {
            let (mean, sd) = mean_and_std(&values);
            writeln!(
                f,
                "{:<12} n={:<4} mean DP_Score={:.3} sd={:.3}",
                class,
                values.len(),
                mean,
                sd
            )?;
        }

        let outliers = self.scores.iter().filter(|s| s.outlier).count();
        writeln!(f, "{} outliers flagged", outliers)
    }
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_analysis() -> Analysis {
        Analysis {
            id: "dps_2025-01-01_00-00-00".to_string(),
            timestamp: "2025-01-01_00-00-00".to_string(),
            dpscore_version: "0.0.0#test".to_string(),
            parameters: Param::default(),
            pairs: vec![
                PairRecord {
                    gene1: "INS".to_string(),
                    gene2: "GCG".to_string(),
                    reversal_ratio: 0.9,
                    importance_score: 0.8,
                },
                PairRecord {
                    gene1: "MAFA".to_string(),
                    gene2: "SST".to_string(),
                    reversal_ratio: 0.75,
                    importance_score: 0.5,
                },
            ],
            scores: vec![
                ScoredSample {
                    sample: "s0".to_string(),
                    class: "ND".to_string(),
                    rank: 0,
                    covariates: vec!["41".to_string()],
                    dp_score: 0.25,
                    outlier: false,
                },
                ScoredSample {
                    sample: "s1".to_string(),
                    class: "T2D".to_string(),
                    rank: 1,
                    covariates: vec!["52".to_string()],
                    dp_score: 0.75,
                    outlier: true,
                },
            ],
            covariate_names: crate::string_vec!["Age"],
            correlation: Some(CorrelationReport::Continuous {
                covariate: "Age".to_string(),
                class: "T2D".to_string(),
                n: 2,
                rho: 0.5,
                p_value: 0.2,
            }),
            execution_time: 1.5,
        }
    }

    #[test]
    fn test_serialization_json_roundtrip() {
        let analysis = create_test_analysis();
        let path = std::env::temp_dir().join("dpscore_roundtrip.json");
        analysis.save_auto(&path).expect("saving should work");
        let loaded = Analysis::load_auto(&path).expect("loading should work");
        assert_eq!(analysis, loaded);
    }

    #[test]
    fn test_serialization_bincode_roundtrip() {
        let analysis = create_test_analysis();
        let path = std::env::temp_dir().join("dpscore_roundtrip.bin");
        analysis.save_auto(&path).expect("saving should work");
        let loaded = Analysis::load_auto(&path).expect("loading should work");
        assert_eq!(analysis, loaded);
    }

    #[test]
    fn test_save_auto_defaults_to_json() {
        let analysis = create_test_analysis();
        let path = std::env::temp_dir().join("dpscore_autodetect.xyz");
        analysis.save_auto(&path).expect("saving should work");
        let json_path = path.with_extension("json");
        assert!(json_path.exists(), "unknown extensions should save as JSON");
        let loaded = Analysis::load_auto(&json_path).expect("loading should work");
        assert_eq!(analysis, loaded);
    }

    #[test]
    fn test_write_tables_layout() {
        let analysis = create_test_analysis();
        let dir = std::env::temp_dir().join("dpscore_tables");
        let dir_str = dir.to_string_lossy().to_string();
        analysis.write_tables(&dir_str).expect("tables should write");

        let pairs = std::fs::read_to_string(dir.join("Gene_pairs_table.csv")).unwrap();
        let mut lines = pairs.lines();
        assert_eq!(
            lines.next(),
            Some("Gene1,Gene2,ReversalRatio,ImportanceScore")
        );
        assert_eq!(lines.next(), Some("INS,GCG,0.9,0.8"));
        assert_eq!(pairs.lines().count(), 3, "header plus one line per pair");

        let scores = std::fs::read_to_string(dir.join("DP_score_table.csv")).unwrap();
        let mut lines = scores.lines();
        assert_eq!(
            lines.next(),
            Some("Sample,Class,Rank,Age,DP_Score,Outlier")
        );
        assert_eq!(lines.next(), Some("s0,ND,0,41,0.25,No"));
        assert_eq!(lines.next(), Some("s1,T2D,1,52,0.75,Yes"));

        let corr = std::fs::read_to_string(dir.join("Correlation_table.csv")).unwrap();
        assert_eq!(
            corr.lines().next(),
            Some("Class,Covariate,N,SpearmanRho,PValue")
        );
        assert_eq!(corr.lines().count(), 2);
    }

    #[test]
    fn test_display_lists_top_pairs_and_classes() {
        let analysis = create_test_analysis();
        let text = format!("{}", analysis);
        assert!(text.contains("2 gene pairs"));
        assert!(text.contains("INS"), "top pairs should be listed");
        assert!(text.contains("ND") && text.contains("T2D"));
        assert!(text.contains("1 outliers flagged"));
    }
}
