use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Input line {0} has {1} fields but at least {2} are required: {3:?}")]
    MissingFields(u64, usize, usize, String),
    #[error("Input line {0} has a non-numeric timestamp {1:?}: {2:?}")]
    BadTimestamp(u64, String, String),
    #[error("Input line {0} has a non-numeric value {1:?}: {2:?}")]
    BadValue(u64, String, String),
    #[error("Input line {0} is not valid UTF-8")]
    BadEncoding(u64),
    #[error("Input is not sorted -- line {0} has timestamp {1} which precedes the previous timestamp {2}")]
    OutOfOrder(u64, f64, f64),
    #[error("Reading input failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Can't parse channel pattern {0:?}; expected <name>:<chan1>,<chan2>,...")]
    BadPattern(String),
    #[error("Channel pattern {0:?} has an empty trigger name")]
    EmptyName(String),
    #[error("Channel pattern {0:?} does not list any channels")]
    NoChannels(String),
    #[error("Trigger name {0:?} can't be used in an output file name")]
    BadName(String),
    #[error("Could not read channel patterns because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reading channel patterns failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to create output directory {0:?}: {1}")]
    CreateDirectory(PathBuf, #[source] std::io::Error),
    #[error("Failed to open output file {0:?}: {1}")]
    OpenError(PathBuf, #[source] std::io::Error),
    #[error("Failed to write to the output of trigger {0}: {1}")]
    WriteError(String, #[source] std::io::Error),
    #[error("Trigger {0} fired but has no output file")]
    UnknownTrigger(String),
    #[error("Writing cluster dump failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Jitter must be a finite, non-negative number; got {0}")]
    InvalidJitter(f64),
    #[error("Threshold must be a number; got {0}")]
    InvalidThreshold(f64),
    #[error("Column layout {0:?} is invalid; expected three distinct indices as TS,CHAN,VAL")]
    InvalidColumns(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to input error: {0}")]
    RecordError(#[from] RecordError),
    #[error("Processor failed due to trigger configuration error: {0}")]
    TriggerError(#[from] TriggerError),
    #[error("Processor failed due to output error: {0}")]
    SinkError(#[from] SinkError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
}
