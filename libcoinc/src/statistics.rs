use std::collections::BTreeMap;
use std::fmt;

use super::cluster_builder::Cluster;
use super::record::ParseCounts;

/// Counters for a single run, reported once at shutdown.
///
/// Purely informational: nothing in the pipeline makes decisions based on these values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub records_parsed: u64,
    pub records_accepted: u64,
    pub below_threshold: u64,
    pub clusters: u64,
    pub clustered_records: u64,
    pub singletons: u64,
    /// Number of clusters for each cluster size
    pub cluster_sizes: BTreeMap<usize, u64>,
    /// Number of lines written for each trigger
    pub trigger_lines: BTreeMap<String, u64>,
    pub lines_written: u64,
    pub interrupted: bool,
}

impl RunStatistics {
    pub fn record_cluster(&mut self, cluster: &Cluster) {
        self.clusters += 1;
        self.clustered_records += cluster.len() as u64;
        *self.cluster_sizes.entry(cluster.len()).or_default() += 1;
    }

    pub fn record_firing(&mut self, trigger_name: &str) {
        self.lines_written += 1;
        match self.trigger_lines.get_mut(trigger_name) {
            Some(count) => *count += 1,
            None => {
                self.trigger_lines.insert(trigger_name.to_string(), 1);
            }
        }
    }

    /// Copy the parser counters in once the stream is done
    pub fn add_parse_counts(&mut self, counts: &ParseCounts) {
        self.records_parsed = counts.records_parsed;
        self.records_accepted = counts.records_accepted;
        self.below_threshold = counts.below_threshold;
    }

    pub fn is_empty(&self) -> bool {
        self.records_parsed == 0
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "records: {} parsed, {} accepted, {} below threshold",
            self.records_parsed, self.records_accepted, self.below_threshold
        )?;
        writeln!(
            f,
            "clusters: {} ({} records clustered, {} singletons)",
            self.clusters, self.clustered_records, self.singletons
        )?;
        let sizes: Vec<String> = self
            .cluster_sizes
            .iter()
            .map(|(size, count)| format!("{size}: {count}"))
            .collect();
        writeln!(f, "cluster size stats: {{{}}}", sizes.join(", "))?;
        let lines: Vec<String> = self
            .trigger_lines
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect();
        write!(
            f,
            "lines written: {} {{{}}}",
            self.lines_written,
            lines.join(", ")
        )?;
        if self.interrupted {
            write!(f, "\nrun was interrupted before the end of input")?;
        }
        Ok(())
    }
}
