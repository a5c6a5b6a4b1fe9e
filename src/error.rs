use std::fmt;
use std::io;
use std::path::PathBuf;

/// Terminal failures of the scoring pipeline. Every variant aborts the run
/// before any output table is written; there is no degraded mode.
#[derive(Debug)]
pub enum DpsError {
    /// An input table violates its documented layout or dataset contract.
    Schema(String),
    /// Too few reversed gene pairs survived the threshold to form a panel.
    InsufficientPairs { found: usize, required: usize },
    /// Gene-set symbols that do not exist in the expression table.
    UnknownGene { set: String, missing: Vec<String> },
    /// The gene-set restriction removed every candidate pair.
    EmptyPanel { set: String },
    /// A requested class label is absent from the sample-info Class column.
    InvalidCategory { label: String },
    /// Invalid or inconsistent configuration values.
    Parameter(String),
    /// A file could not be read or written.
    Io { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, DpsError>;

impl DpsError {
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> DpsError {
        DpsError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Shortens long symbol lists in error messages to the first few entries.
fn preview(symbols: &[String]) -> String {
    const SHOWN: usize = 5;
    if symbols.len() <= SHOWN {
        symbols.join(", ")
    } else {
        format!(
            "{} and {} more",
            symbols[..SHOWN].join(", "),
            symbols.len() - SHOWN
        )
    }
}

impl fmt::Display for DpsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpsError::Schema(msg) => write!(f, "invalid input table: {}", msg),
            DpsError::InsufficientPairs { found, required } => write!(
                f,
                "only {} reversed gene pairs exceed the threshold (minimum {}); \
                 lower the threshold or check that the two groups actually differ",
                found, required
            ),
            DpsError::UnknownGene { set, missing } => write!(
                f,
                "gene set '{}' contains symbols absent from the expression table: {}",
                set,
                preview(missing)
            ),
            DpsError::EmptyPanel { set } => write!(
                f,
                "gene set '{}' removed every reversed gene pair; \
                 the listed genes show no ordering difference between the groups",
                set
            ),
            DpsError::InvalidCategory { label } => write!(
                f,
                "class '{}' does not exist in the sample-info Class column",
                label
            ),
            DpsError::Parameter(msg) => write!(f, "invalid parameter: {}", msg),
            DpsError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for DpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DpsError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_truncates_long_symbol_lists() {
        let err = DpsError::UnknownGene {
            set: "panel".to_string(),
            missing: (0..8).map(|i| format!("GENE{}", i)).collect(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("GENE4") && msg.contains("and 3 more"),
            "expected a truncated symbol list, got: {}",
            msg
        );
        assert!(
            !msg.contains("GENE5"),
            "symbols past the preview should not be listed: {}",
            msg
        );
    }

    #[test]
    fn test_io_error_keeps_path_and_source() {
        let err = DpsError::io(
            "data/missing.csv",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("data/missing.csv"));
        assert!(
            std::error::Error::source(&err).is_some(),
            "Io errors should expose their source"
        );
    }
}
