use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};

use super::cluster_builder::{Cluster, ClusterBuilder};
use super::error::RecordError;
use super::record::{ParseCounts, RecordStream};

/// ClusterStream glues a RecordStream to a ClusterBuilder and yields finished Clusters lazily.
///
/// The stream only moves forward; to start over the underlying input has to be read again.
/// If an interrupt flag is attached, it is checked before every line. Once it is set the
/// stream ends without emitting the cluster that was still being built.
#[derive(Debug)]
pub struct ClusterStream<'a, R> {
    records: RecordStream<R>,
    builder: ClusterBuilder,
    interrupt: Option<&'a AtomicBool>,
    interrupted: bool,
    is_ended: bool,
}

impl<'a, R: BufRead> ClusterStream<'a, R> {
    pub fn new(records: RecordStream<R>, jitter: f64) -> Self {
        Self {
            records,
            builder: ClusterBuilder::new(jitter),
            interrupt: None,
            interrupted: false,
            is_ended: false,
        }
    }

    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Get the next finished cluster
    ///
    /// Returns a `Result<Option<Cluster>>`. The Option is None once the input is exhausted
    /// (or the stream was interrupted). After an error the stream is ended.
    pub fn get_next_cluster(&mut self) -> Result<Option<Cluster>, RecordError> {
        loop {
            if self.is_ended {
                return Ok(None);
            }
            if self.interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                self.interrupted = true;
                self.is_ended = true;
                return Ok(None);
            }

            match self.records.get_next_record() {
                Ok(Some(record)) => {
                    if let Some(cluster) = self.builder.append_record(record) {
                        return Ok(Some(cluster));
                    }
                }
                Ok(None) => {
                    self.is_ended = true;
                    return Ok(self.builder.flush_final_cluster());
                }
                Err(e) => {
                    self.is_ended = true;
                    return Err(e);
                }
            }
        }
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn parse_counts(&self) -> &ParseCounts {
        self.records.counts()
    }

    pub fn singletons(&self) -> u64 {
        self.builder.singletons()
    }

    pub fn bytes_read(&self) -> u64 {
        self.records.bytes_read()
    }
}

impl<R: BufRead> Iterator for ClusterStream<'_, R> {
    type Item = Result<Cluster, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next_cluster().transpose()
    }
}
