use crate::error::{DpsError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;

/// Minimum number of genes an expression table must carry.
pub const MIN_GENE_COUNT: usize = 100;
/// Minimum number of samples per compared class.
pub const MIN_GROUP_SIZE: usize = 10;
/// Required fraction of non-zero values per gene row.
const MIN_NON_ZERO_FRACTION: (usize, usize) = (4, 5);

/// Gene expression matrix, dense and row-major, rows sorted by gene symbol.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExpressionTable {
    pub genes: Vec<String>,
    pub samples: Vec<String>,
    pub values: Vec<f64>,
    pub gene_index: HashMap<String, usize>,
    pub gene_len: usize,
    pub sample_len: usize,
}

impl ExpressionTable {
    /// Load an expression table from a CSV file whose first column is `Symbol`
    /// and whose remaining columns are sample measurements.
    pub fn load(path: &str) -> Result<ExpressionTable> {
        info!("Loading expression table {}...", path);
        let file = File::open(path).map_err(|e| DpsError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?
            .clone();
        let mut header_iter = headers.iter();
        match header_iter.next() {
            Some("Symbol") => {}
            Some(other) => {
                return Err(DpsError::Schema(format!(
                    "{}: first column must be named 'Symbol', found '{}'",
                    path, other
                )))
            }
            None => return Err(DpsError::Schema(format!("{}: empty header line", path))),
        }
        let samples: Vec<String> = header_iter.map(String::from).collect();
        let sample_len = samples.len();

        let mut seen_samples = HashSet::new();
        for sample in &samples {
            if sample.is_empty() {
                return Err(DpsError::Schema(format!("{}: empty sample name", path)));
            }
            if !seen_samples.insert(sample.as_str()) {
                return Err(DpsError::Schema(format!(
                    "{}: duplicated sample '{}'",
                    path, sample
                )));
            }
        }

        let mut raw_genes: Vec<String> = Vec::new();
        let mut raw_rows: Vec<Vec<f64>> = Vec::new();
        let mut seen_genes = HashSet::new();
        for result in reader.records() {
            let record = result.map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?;
            let symbol = record.get(0).unwrap_or("").to_string();
            if symbol.is_empty() {
                return Err(DpsError::Schema(format!(
                    "{}: empty gene symbol at row {}",
                    path,
                    raw_genes.len() + 2
                )));
            }
            if !seen_genes.insert(symbol.clone()) {
                return Err(DpsError::Schema(format!(
                    "{}: duplicated gene symbol '{}'",
                    path, symbol
                )));
            }

            let mut row = Vec::with_capacity(sample_len);
            for (column, cell) in record.iter().skip(1).enumerate() {
                let value: f64 = cell.parse().map_err(|_| {
                    DpsError::Schema(format!(
                        "{}: gene '{}' has non-numeric value '{}' in column '{}'",
                        path, symbol, cell, samples[column]
                    ))
                })?;
                row.push(value);
            }
            raw_genes.push(symbol);
            raw_rows.push(row);
        }

        if raw_genes.len() < MIN_GENE_COUNT {
            return Err(DpsError::Schema(format!(
                "{}: expression table has {} genes; at least {} are required",
                path,
                raw_genes.len(),
                MIN_GENE_COUNT
            )));
        }

        let (num, den) = MIN_NON_ZERO_FRACTION;
        let sparse: Vec<String> = raw_genes
            .iter()
            .zip(raw_rows.iter())
            .filter(|(_, row)| {
                let non_zero = row.iter().filter(|v| **v != 0.0).count();
                non_zero * den < sample_len * num
            })
            .map(|(symbol, _)| symbol.clone())
            .collect();
        if !sparse.is_empty() {
            return Err(DpsError::Schema(format!(
                "{}: {} genes fall below {}% non-zero values, starting with '{}'",
                path,
                sparse.len(),
                num * 100 / den,
                sparse[0]
            )));
        }

        // rows are kept sorted by symbol so every downstream pass enumerates
        // genes in one reproducible order
        let mut order: Vec<usize> = (0..raw_genes.len()).collect();
        order.sort_by(|&a, &b| raw_genes[a].cmp(&raw_genes[b]));

        let gene_len = raw_genes.len();
        let mut genes = Vec::with_capacity(gene_len);
        let mut values = vec![0.0; gene_len * sample_len];
        for (new_row, &old_row) in order.iter().enumerate() {
            genes.push(raw_genes[old_row].clone());
            values[new_row * sample_len..(new_row + 1) * sample_len]
                .copy_from_slice(&raw_rows[old_row]);
        }

        let gene_index: HashMap<String, usize> = genes
            .iter()
            .enumerate()
            .map(|(i, symbol)| (symbol.clone(), i))
            .collect();

        info!("{} genes and {} samples loaded", gene_len, sample_len);
        Ok(ExpressionTable {
            genes,
            samples,
            values,
            gene_index,
            gene_len,
            sample_len,
        })
    }

    #[inline]
    pub fn value(&self, gene: usize, sample: usize) -> f64 {
        self.values[gene * self.sample_len + sample]
    }

    #[inline]
    pub fn row(&self, gene: usize) -> &[f64] {
        &self.values[gene * self.sample_len..(gene + 1) * self.sample_len]
    }

    /// Column index of every sample name.
    pub fn column_map(&self) -> HashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, sample)| (sample.as_str(), i))
            .collect()
    }
}

impl fmt::Display for ExpressionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let _ = writeln!(
            f,
            "Genes: {}   Samples: {}",
            self.gene_len, self.sample_len
        );

        let samples_string = self.samples.join("\t");
        let truncated_samples = if samples_string.len() > 100 {
            format!("{}...", &samples_string[..97])
        } else {
            samples_string
        };

        writeln!(f, "expression:         {}", truncated_samples)?;
        // Limit to the first 20 rows
        for g in (0..self.gene_len).take(20) {
            let row_display: String = self
                .row(g)
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join("\t");

            let truncated_row = if row_display.len() > 80 {
                format!("{}...", &row_display[..77])
            } else {
                row_display
            };

            writeln!(f, "{:<20} {}", self.genes[g], truncated_row)?;
        }

        Ok(())
    }
}

impl fmt::Debug for ExpressionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}

/// One row of the sample-info table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleRecord {
    pub sample: String,
    pub class: String,
    pub rank: u32,
    pub covariates: Vec<String>,
}

/// Sample metadata, in file row order.
#[derive(Clone, Serialize, Deserialize)]
pub struct SampleTable {
    pub records: Vec<SampleRecord>,
    pub covariate_names: Vec<String>,
}

impl SampleTable {
    /// Load sample metadata from a CSV file starting with the columns
    /// `Sample`, `Class` and `Rank`; any further columns are covariates.
    pub fn load(path: &str) -> Result<SampleTable> {
        info!("Loading sample info {}...", path);
        let file = File::open(path).map_err(|e| DpsError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?
            .clone();
        let names: Vec<&str> = headers.iter().collect();
        if names.len() < 3 || names[0] != "Sample" || names[1] != "Class" || names[2] != "Rank" {
            return Err(DpsError::Schema(format!(
                "{}: sample info must start with the columns Sample, Class and Rank",
                path
            )));
        }
        let covariate_names: Vec<String> = names[3..].iter().map(|s| s.to_string()).collect();

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut classes = HashSet::new();
        for result in reader.records() {
            let record = result.map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?;
            let sample = record.get(0).unwrap_or("").to_string();
            let class = record.get(1).unwrap_or("").to_string();
            let rank_cell = record.get(2).unwrap_or("");
            if sample.is_empty() || class.is_empty() {
                return Err(DpsError::Schema(format!(
                    "{}: missing Sample or Class value at row {}",
                    path,
                    records.len() + 2
                )));
            }
            if !seen.insert(sample.clone()) {
                return Err(DpsError::Schema(format!(
                    "{}: duplicated sample '{}'",
                    path, sample
                )));
            }
            let rank: u32 = rank_cell.parse().map_err(|_| {
                DpsError::Schema(format!(
                    "{}: sample '{}' has non-integer rank '{}'",
                    path, sample, rank_cell
                ))
            })?;
            classes.insert(class.clone());
            let covariates: Vec<String> = record.iter().skip(3).map(String::from).collect();
            records.push(SampleRecord {
                sample,
                class,
                rank,
                covariates,
            });
        }

        if classes.len() < 2 {
            return Err(DpsError::Schema(format!(
                "{}: sample info must contain at least 2 classes, found {}",
                path,
                classes.len()
            )));
        }

        info!(
            "{} samples across {} classes loaded",
            records.len(),
            classes.len()
        );
        Ok(SampleTable {
            records,
            covariate_names,
        })
    }

    /// Position of a covariate column by name.
    pub fn covariate_position(&self, name: &str) -> Option<usize> {
        self.covariate_names.iter().position(|n| n == name)
    }
}

impl fmt::Display for SampleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Samples: {}   Covariates: {}",
            self.records.len(),
            self.covariate_names.join(", ")
        )?;
        // Limit to the first 20 entries
        for record in self.records.iter().take(20) {
            writeln!(f, "{}\t{}\t{}", record.sample, record.class, record.rank)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SampleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}

/// A named list of gene symbols read from a one-column CSV file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneSet {
    pub name: String,
    pub genes: Vec<String>,
}

/// A gene set mapped onto expression-table row indices.
#[derive(Clone, Debug)]
pub struct ResolvedGeneSet {
    pub name: String,
    pub indices: HashSet<usize>,
}

impl GeneSet {
    pub fn load(path: &str) -> Result<GeneSet> {
        let file = File::open(path).map_err(|e| DpsError::io(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?
            .clone();
        if headers.len() != 1 {
            return Err(DpsError::Schema(format!(
                "{}: a gene-set file must have exactly one column, found {}",
                path,
                headers.len()
            )));
        }
        let name = headers
            .get(0)
            .unwrap_or("gene_set")
            .to_string();

        let mut genes = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| DpsError::Schema(format!("{}: {}", path, e)))?;
            let symbol = record.get(0).unwrap_or("").trim().to_string();
            // blank rows are tolerated, like empty cells in a hand-edited list
            if !symbol.is_empty() {
                genes.push(symbol);
            }
        }

        info!("Gene set '{}' with {} symbols loaded", name, genes.len());
        Ok(GeneSet { name, genes })
    }

    /// Map every symbol onto its expression-table row index. All symbols
    /// must exist; unknown ones are reported together.
    pub fn resolve(&self, expr: &ExpressionTable) -> Result<ResolvedGeneSet> {
        let mut indices = HashSet::new();
        let mut missing = Vec::new();
        let mut reported = HashSet::new();
        for symbol in &self.genes {
            match expr.gene_index.get(symbol) {
                Some(&index) => {
                    indices.insert(index);
                }
                None => {
                    if reported.insert(symbol.clone()) {
                        missing.push(symbol.clone());
                    }
                }
            }
        }
        if !missing.is_empty() {
            return Err(DpsError::UnknownGene {
                set: self.name.clone(),
                missing,
            });
        }
        Ok(ResolvedGeneSet {
            name: self.name.clone(),
            indices,
        })
    }
}

/// Expression-table column indices of every sample belonging to `label`,
/// in sample-info row order.
pub fn group_columns(
    expr: &ExpressionTable,
    table: &SampleTable,
    label: &str,
) -> Result<Vec<usize>> {
    let members: Vec<&SampleRecord> = table
        .records
        .iter()
        .filter(|record| record.class == label)
        .collect();
    if members.is_empty() {
        return Err(DpsError::InvalidCategory {
            label: label.to_string(),
        });
    }
    if members.len() < MIN_GROUP_SIZE {
        return Err(DpsError::Schema(format!(
            "class '{}' has {} samples; at least {} are required",
            label,
            members.len(),
            MIN_GROUP_SIZE
        )));
    }

    let columns = expr.column_map();
    let mut resolved = Vec::with_capacity(members.len());
    for record in members {
        match columns.get(record.sample.as_str()) {
            Some(&column) => resolved.push(column),
            None => {
                return Err(DpsError::Schema(format!(
                    "sample '{}' of class '{}' has no column in the expression table",
                    record.sample, label
                )))
            }
        }
    }
    Ok(resolved)
}
