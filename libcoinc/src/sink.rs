use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::cluster_builder::Cluster;
use super::config::Config;
use super::error::SinkError;
use super::statistics::RunStatistics;
use super::trigger::{FiredTriggers, TriggerSet};

/// One open output file
#[derive(Debug)]
struct Destination {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// SinkDispatcher owns one output file per trigger and copies fired records into them.
///
/// Files are named `<prefix><trigger>.txt` and are created (truncated) when the dispatcher
/// is opened, so every configured trigger gets a file even if it never fires. Each record is
/// written as a single complete line.
#[derive(Debug)]
pub struct SinkDispatcher {
    destinations: BTreeMap<String, Destination>,
    line_buffer: Vec<u8>,
}

impl SinkDispatcher {
    /// Create the output directory and open a file for every trigger
    pub fn open(config: &Config, triggers: &TriggerSet) -> Result<Self, SinkError> {
        if let Some(dir) = config.get_output_directory() {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| SinkError::CreateDirectory(dir, e))?;
            }
        }

        let mut destinations = BTreeMap::new();
        for name in triggers.names() {
            let path = config.get_output_file_name(name);
            let file = File::create(&path).map_err(|e| SinkError::OpenError(path.clone(), e))?;
            log::debug!("Opened output for trigger {} at {}", name, path.display());
            destinations.insert(
                name.to_string(),
                Destination {
                    path,
                    writer: BufWriter::new(file),
                },
            );
        }

        Ok(Self {
            destinations,
            line_buffer: Vec::new(),
        })
    }

    /// Write each record of the cluster once per trigger it fired.
    ///
    /// `fired` must hold one entry per record of the cluster, as returned by the TriggerEvaluator.
    pub fn dispatch(
        &mut self,
        cluster: &Cluster,
        fired: &[FiredTriggers<'_>],
        stats: &mut RunStatistics,
    ) -> Result<(), SinkError> {
        for (record, triggers) in cluster.records().iter().zip(fired) {
            if triggers.is_empty() {
                continue;
            }
            self.line_buffer.clear();
            self.line_buffer.extend_from_slice(record.raw().as_bytes());
            self.line_buffer.push(b'\n');

            for name in triggers {
                let destination = self
                    .destinations
                    .get_mut(*name)
                    .ok_or_else(|| SinkError::UnknownTrigger(name.to_string()))?;
                destination
                    .writer
                    .write_all(&self.line_buffer)
                    .map_err(|e| SinkError::WriteError(name.to_string(), e))?;
                stats.record_firing(name);
            }
        }
        Ok(())
    }

    /// Paths of the open files, ordered by trigger name
    pub fn paths(&self) -> impl Iterator<Item = (&str, &PathBuf)> {
        self.destinations
            .iter()
            .map(|(name, destination)| (name.as_str(), &destination.path))
    }

    /// Flush and close every file
    pub fn finish(mut self) -> Result<(), SinkError> {
        for (name, destination) in self.destinations.iter_mut() {
            destination
                .writer
                .flush()
                .map_err(|e| SinkError::WriteError(name.clone(), e))?;
        }
        Ok(())
    }
}

/// Write a cluster to a plain stream, one raw line per record, followed by a `--` separator
pub fn write_cluster<W: Write>(out: &mut W, cluster: &Cluster) -> Result<(), SinkError> {
    for record in cluster {
        out.write_all(record.raw().as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.write_all(b"--\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_builder::ClusterBuilder;
    use crate::record::Record;
    use std::collections::BTreeSet;

    fn pair() -> Cluster {
        let mut builder = ClusterBuilder::new(1.0);
        builder.append_record(Record::new(0.0, "A", 1.0, "0 A 1", 1));
        builder.append_record(Record::new(0.5, "B", 1.0, "0.5 B 1", 2));
        builder.flush_final_cluster().unwrap()
    }

    #[test]
    fn test_files_are_created_for_every_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_prefix: format!("{}/nested/run_", dir.path().display()),
            ..Default::default()
        };
        let triggers = TriggerSet::from_patterns(["A:1,2", "B:3"]).unwrap();
        let sinks = SinkDispatcher::open(&config, &triggers).unwrap();
        assert_eq!(sinks.paths().count(), 2);
        sinks.finish().unwrap();
        assert!(dir.path().join("nested/run_A.txt").exists());
        assert!(dir.path().join("nested/run_B.txt").exists());
    }

    #[test]
    fn test_dispatch_duplicates_per_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_prefix: format!("{}/coinc_", dir.path().display()),
            ..Default::default()
        };
        let triggers = TriggerSet::from_patterns(["T1:A,B", "T2:A"]).unwrap();
        let mut sinks = SinkDispatcher::open(&config, &triggers).unwrap();
        let mut stats = RunStatistics::default();
        let fired = vec![BTreeSet::from(["T1", "T2"]), BTreeSet::from(["T1"])];
        sinks.dispatch(&pair(), &fired, &mut stats).unwrap();
        sinks.finish().unwrap();

        let t1 = std::fs::read_to_string(dir.path().join("coinc_T1.txt")).unwrap();
        let t2 = std::fs::read_to_string(dir.path().join("coinc_T2.txt")).unwrap();
        assert_eq!(t1, "0 A 1\n0.5 B 1\n");
        assert_eq!(t2, "0 A 1\n");
        assert_eq!(stats.lines_written, 3);
        assert_eq!(stats.trigger_lines.get("T1"), Some(&2));
    }

    #[test]
    fn test_unknown_trigger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_prefix: format!("{}/coinc_", dir.path().display()),
            ..Default::default()
        };
        let triggers = TriggerSet::from_patterns(["T1:A,B"]).unwrap();
        let mut sinks = SinkDispatcher::open(&config, &triggers).unwrap();
        let fired = vec![BTreeSet::from(["other"]), BTreeSet::new()];
        let result = sinks.dispatch(&pair(), &fired, &mut RunStatistics::default());
        assert!(matches!(result, Err(SinkError::UnknownTrigger(_))));
    }

    #[test]
    fn test_unwritable_output_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let config = Config {
            output_prefix: format!("{}/sub/coinc_", blocker.display()),
            ..Default::default()
        };
        let triggers = TriggerSet::from_patterns(["T:A"]).unwrap();
        assert!(matches!(
            SinkDispatcher::open(&config, &triggers),
            Err(SinkError::CreateDirectory(_, _))
        ));
    }

    #[test]
    fn test_write_cluster() {
        let mut out = Vec::new();
        write_cluster(&mut out, &pair()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0 A 1\n0.5 B 1\n--\n");
    }
}
