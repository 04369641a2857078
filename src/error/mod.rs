/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion paths model
//
// error module
//
// errors raised by the simulation core and by the file/config layer
//
////////////////////////////////////////////////////////////////////////////////////

use thiserror::Error;

// Core errors: configuration, divergence, scheduling
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid configuration in {context}: {reason}")]
    InvalidConfiguration { context: String, reason: String },

    #[error("model diverged on day {day}: population sum {actual} != {expected}")]
    Divergence {
        day: usize,
        expected: f64,
        actual: f64,
    },

    #[error("compartment '{compartment}' went negative on day {day} ({count})")]
    NegativeCount {
        compartment: String,
        day: usize,
        count: f64,
    },

    #[error("invalid R0 schedule: {0}")]
    Schedule(String),

    #[error("series '{series}' has {actual} values, expected {expected}")]
    LengthMismatch {
        series: String,
        expected: usize,
        actual: usize,
    },

    #[error("degenerate reference data: {0}")]
    DegenerateReference(String),
}

impl ModelError {
    pub fn config(context: &str, reason: impl Into<String>) -> ModelError {
        ModelError::InvalidConfiguration {
            context: String::from(context),
            reason: reason.into(),
        }
    }
}

// File system, YAML and CSV errors
#[derive(Debug, Error)]
pub enum DataError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML - {0}")]
    Yaml(#[from] yaml_rust::ScanError),

    #[error("YAML - expected '{0}' parameter")]
    MissingKey(String),

    #[error("YAML - bad value for '{key}': {reason}")]
    BadValue { key: String, reason: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl DataError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> DataError {
        DataError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
