use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::ConfigError;
use super::trigger::{MembershipPolicy, WindowPolicy};

pub const DEFAULT_OUTPUT_PREFIX: &str = "out/coinc_";
pub const DEFAULT_JITTER: f64 = 1.0;

/// Which whitespace-separated column holds each field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub timestamp: usize,
    pub channel: usize,
    pub value: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            timestamp: 0,
            channel: 1,
            value: 2,
        }
    }
}

impl ColumnLayout {
    /// Minimum number of fields a line needs to hold every column
    pub fn required_fields(&self) -> usize {
        self.timestamp.max(self.channel).max(self.value) + 1
    }

    pub fn is_valid(&self) -> bool {
        self.timestamp != self.channel && self.timestamp != self.value && self.channel != self.value
    }
}

impl FromStr for ColumnLayout {
    type Err = ConfigError;

    /// Parse the `TS,CHAN,VAL` form, e.g. `0,1,2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let columns: Vec<usize> = s
            .split(',')
            .map(|field| field.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| ConfigError::InvalidColumns(s.to_string()))?;
        if columns.len() != 3 {
            return Err(ConfigError::InvalidColumns(s.to_string()));
        }
        let layout = Self {
            timestamp: columns[0],
            channel: columns[1],
            value: columns[2],
        };
        if layout.is_valid() {
            Ok(layout)
        } else {
            Err(ConfigError::InvalidColumns(s.to_string()))
        }
    }
}

/// Structure representing the application configuration. Contains the input, output and clustering parameters
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_path: Option<PathBuf>,
    pub output_prefix: String,
    pub jitter: f64,
    pub threshold: Option<f64>,
    pub columns: ColumnLayout,
    pub patterns: Vec<String>,
    pub pattern_file: Option<PathBuf>,
    pub window: WindowPolicy,
    pub membership: MembershipPolicy,
    pub dump_clusters: bool,
    pub print_stats: bool,
    pub show_progress: bool,
    pub debug: bool,
}

impl Default for Config {
    /// Read from stdin, write to `out/coinc_<trigger>.txt`, no triggers
    fn default() -> Self {
        Self {
            input_path: None,
            output_prefix: String::from(DEFAULT_OUTPUT_PREFIX),
            jitter: DEFAULT_JITTER,
            threshold: None,
            columns: ColumnLayout::default(),
            patterns: vec![],
            pattern_file: None,
            window: WindowPolicy::default(),
            membership: MembershipPolicy::default(),
            dump_clusters: false,
            print_stats: false,
            show_progress: false,
            debug: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Check the numeric parameters before any data is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(ConfigError::InvalidJitter(self.jitter));
        }
        if let Some(threshold) = self.threshold {
            if threshold.is_nan() {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }
        if !self.columns.is_valid() {
            return Err(ConfigError::InvalidColumns(format!(
                "{},{},{}",
                self.columns.timestamp, self.columns.channel, self.columns.value
            )));
        }
        Ok(())
    }

    pub fn has_patterns(&self) -> bool {
        !self.patterns.is_empty() || self.pattern_file.is_some()
    }

    /// Statistics are always reported in debug mode
    pub fn report_stats(&self) -> bool {
        self.print_stats || self.debug
    }

    /// Path of the output file for a given trigger name
    pub fn get_output_file_name(&self, trigger_name: &str) -> PathBuf {
        PathBuf::from(format!("{}{}.txt", self.output_prefix, trigger_name))
    }

    /// Directory that must exist before output files can be created, if any
    pub fn get_output_directory(&self) -> Option<PathBuf> {
        Path::new(&self.output_prefix)
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}
