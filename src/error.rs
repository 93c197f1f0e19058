use std::fmt;

use thiserror::Error;

/// One entry read back from the instrument's error queue (`SYST:ERR?`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentError {
    pub code: i32,
    pub message: String,
}

impl fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

fn join_errors(errors: &[InstrumentError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid resource: {0}")]
    Resource(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Instrument reported errors after '{context}': {}", join_errors(.errors))]
    InstrumentStatus {
        context: String,
        errors: Vec<InstrumentError>,
    },
    #[error("Unexpected instrument model: {0}")]
    UnexpectedModel(String),
    #[error("Invalid channel {0}")]
    Channel(u8),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
