use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotifError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed PWM '{motif}': {reason}")]
    MalformedPwm { motif: String, reason: String },

    #[error(
        "Width mismatch: '{query}' has {query_width} positions, '{comparison}' has {comparison_width}"
    )]
    WidthMismatch {
        query: String,
        comparison: String,
        query_width: usize,
        comparison_width: usize,
    },

    #[error(
        "Invalid frequency {value} for residue {residue} at position {position} ('{query}' vs '{comparison}')"
    )]
    InvalidFrequency {
        query: String,
        comparison: String,
        residue: char,
        position: usize,
        value: f64,
    },

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid parameter: {name} = {value}, {message}")]
    InvalidParameter {
        name: String,
        value: String,
        message: String,
    },

    #[error("No valid PWMs: {0}")]
    NoValidPwms(String),

    #[error("Nothing scored: {0}")]
    NothingScored(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for batch summary counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedPwm,
    WidthMismatch,
    InvalidFrequency,
    Other,
}

pub type Result<T> = std::result::Result<T, MotifError>;

impl MotifError {
    /// Create a new MalformedPwm error
    pub fn malformed_pwm(motif: impl Into<String>, reason: impl Into<String>) -> Self {
        MotifError::MalformedPwm {
            motif: motif.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidParameter error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        MotifError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MotifError::MalformedPwm { .. } => ErrorKind::MalformedPwm,
            MotifError::WidthMismatch { .. } => ErrorKind::WidthMismatch,
            MotifError::InvalidFrequency { .. } => ErrorKind::InvalidFrequency,
            _ => ErrorKind::Other,
        }
    }
}

impl From<toml::de::Error> for MotifError {
    fn from(e: toml::de::Error) -> Self {
        MotifError::Config(e.to_string())
    }
}
