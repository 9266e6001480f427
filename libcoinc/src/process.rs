use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;

use super::cluster_stream::ClusterStream;
use super::config::Config;
use super::error::{ProcessorError, SinkError, TriggerError};
use super::progress::Progress;
use super::record::RecordStream;
use super::sink::{write_cluster, SinkDispatcher};
use super::statistics::RunStatistics;
use super::trigger::{TriggerEvaluator, TriggerSet};

/// Build the trigger table from the pattern file and the inline patterns.
///
/// Inline patterns are applied last, so they override file patterns with the same name.
pub fn load_triggers(config: &Config) -> Result<TriggerSet, TriggerError> {
    let mut triggers = TriggerSet::new();
    if let Some(path) = &config.pattern_file {
        triggers.add_pattern_file(path)?;
    }
    triggers.add_patterns(config.patterns.iter().map(String::as_str))?;
    Ok(triggers)
}

/// Fill in the end-of-stream counters
fn finish_statistics<R: BufRead>(stream: &ClusterStream<'_, R>, stats: &mut RunStatistics) {
    stats.add_parse_counts(stream.parse_counts());
    stats.singletons = stream.singletons();
    stats.interrupted = stream.was_interrupted();
}

fn make_progress<R: BufRead>(stream: &ClusterStream<'_, R>, stats: &RunStatistics) -> Progress {
    Progress::new(
        stream.bytes_read(),
        stream.parse_counts().records_accepted,
        stats.clusters,
        stats.lines_written,
    )
}

/// Write every cluster to `out` instead of evaluating triggers
pub fn dump_clusters<R: BufRead, W: Write>(
    config: &Config,
    input: R,
    mut out: W,
    interrupt: &AtomicBool,
    mut on_progress: impl FnMut(&Progress),
) -> Result<RunStatistics, ProcessorError> {
    let records = RecordStream::new(input, config.columns, config.threshold);
    let mut stream = ClusterStream::new(records, config.jitter).with_interrupt(interrupt);
    let mut stats = RunStatistics::default();

    while let Some(cluster) = stream.get_next_cluster()? {
        stats.record_cluster(&cluster);
        write_cluster(&mut out, &cluster)?;
        on_progress(&make_progress(&stream, &stats));
    }
    out.flush().map_err(SinkError::from)?;

    finish_statistics(&stream, &mut stats);
    Ok(stats)
}

/// The main loop of coinc.
///
/// Reads time-sorted records from `input`, groups them into clusters, evaluates the configured
/// triggers and writes every fired record to its trigger's file. In dump mode the clusters are
/// written to `dump_out` instead and no trigger files are touched.
///
/// The loop stops early, without error, once `interrupt` is set.
pub fn process<R: BufRead, W: Write>(
    config: &Config,
    input: R,
    dump_out: W,
    interrupt: &AtomicBool,
    mut on_progress: impl FnMut(&Progress),
) -> Result<RunStatistics, ProcessorError> {
    config.validate()?;

    if config.dump_clusters {
        log::info!("Dumping clusters with jitter {}", config.jitter);
        return dump_clusters(config, input, dump_out, interrupt, on_progress);
    }

    let triggers = load_triggers(config)?;
    if triggers.is_empty() {
        log::warn!("No channel patterns were configured, nothing to do.");
        return Ok(RunStatistics::default());
    }
    for trigger in triggers.iter() {
        log::info!(
            "Trigger {} -> {}",
            trigger.name(),
            trigger
                .required_channels()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    let mut sinks = SinkDispatcher::open(config, &triggers)?;
    for (name, path) in sinks.paths() {
        log::debug!("Output for {}: {}", name, path.display());
    }

    let evaluator =
        TriggerEvaluator::new(&triggers, config.jitter, config.window, config.membership);
    let records = RecordStream::new(input, config.columns, config.threshold);
    let mut stream = ClusterStream::new(records, config.jitter).with_interrupt(interrupt);
    let mut stats = RunStatistics::default();

    while let Some(cluster) = stream.get_next_cluster()? {
        stats.record_cluster(&cluster);
        let fired = evaluator.evaluate(&cluster);
        sinks.dispatch(&cluster, &fired, &mut stats)?;
        on_progress(&make_progress(&stream, &stats));
    }
    sinks.finish()?;

    finish_statistics(&stream, &mut stats);
    if stats.is_empty() {
        log::warn!("Input contained no records.");
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_inline_patterns_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let pattern_path = dir.path().join("triggers.txt");
        std::fs::write(&pattern_path, "T: A,B\nU: C\n").unwrap();
        let config = Config {
            pattern_file: Some(pattern_path),
            patterns: vec![String::from("T:A")],
            ..Default::default()
        };
        let triggers = load_triggers(&config).unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers.get("T").unwrap().required_channels().len(), 1);
    }

    #[test]
    fn test_missing_pattern_file() {
        let config = Config {
            pattern_file: Some("/definitely/not/here.txt".into()),
            ..Default::default()
        };
        assert!(matches!(
            load_triggers(&config),
            Err(TriggerError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_dump_clusters() {
        let config = Config {
            dump_clusters: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        let flag = AtomicBool::new(false);
        let mut calls = 0;
        let stats = process(
            &config,
            Cursor::new("0 A 1\n0.5 B 1\n3 A 1\n".as_bytes()),
            &mut out,
            &flag,
            |_| calls += 1,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0 A 1\n0.5 B 1\n--\n");
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.singletons, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            jitter: -2.0,
            ..Default::default()
        };
        let result = process(
            &config,
            Cursor::new(Vec::<u8>::new()),
            std::io::sink(),
            &AtomicBool::new(false),
            |_| (),
        );
        assert!(matches!(result, Err(ProcessorError::ConfigError(_))));
    }
}
