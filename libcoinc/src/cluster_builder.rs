use super::record::Record;

/// A maximal run of records whose consecutive timestamp gaps are all below the jitter.
///
/// A Cluster always holds at least two records; lone records are never emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    records: Vec<Record>,
}

impl Cluster {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a Cluster {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// ClusterBuilder takes time-sorted Records and composes them into Clusters.
///
/// Two consecutive records belong to the same cluster when their timestamp gap is strictly
/// less than the jitter. A gap equal to the jitter starts a new cluster. A record that is
/// not coincident with either neighbour is counted as a singleton and dropped.
#[derive(Debug)]
pub struct ClusterBuilder {
    jitter: f64,
    last_timestamp: Option<f64>,
    previous: Option<Record>,
    pending: Vec<Record>,
    singletons: u64,
}

impl ClusterBuilder {
    pub fn new(jitter: f64) -> Self {
        Self {
            jitter,
            last_timestamp: None,
            previous: None,
            pending: Vec::new(),
            singletons: 0,
        }
    }

    /// Add a record to the stream.
    ///
    /// Returns `Some(Cluster)` when the record closes the cluster being built. The record that
    /// closed it is kept as the start of whatever comes next.
    pub fn append_record(&mut self, record: Record) -> Option<Cluster> {
        let Some(last_timestamp) = self.last_timestamp.replace(record.timestamp()) else {
            // This is the first record ever in history
            self.previous = Some(record);
            return None;
        };

        if record.timestamp() - last_timestamp < self.jitter {
            if self.pending.is_empty() {
                // Coincident with the previous record; it opens the cluster
                if let Some(previous) = self.previous.take() {
                    self.pending.push(previous);
                }
            }
            self.pending.push(record);
            None
        } else {
            let closed = self.take_pending();
            if closed.is_none() && self.previous.is_some() {
                self.singletons += 1;
            }
            self.previous = Some(record);
            closed
        }
    }

    /// Takes any remaining records and flushes them to a cluster.
    ///
    /// Used at the end of the stream. Returns None if no cluster was being built.
    pub fn flush_final_cluster(&mut self) -> Option<Cluster> {
        if self.previous.take().is_some() {
            self.singletons += 1;
        }
        self.take_pending()
    }

    /// Number of records that ended up in no cluster so far
    pub fn singletons(&self) -> u64 {
        self.singletons
    }

    fn take_pending(&mut self) -> Option<Cluster> {
        if self.pending.is_empty() {
            None
        } else {
            Some(Cluster {
                records: std::mem::take(&mut self.pending),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ts: f64, chan: &str) -> Record {
        Record::new(ts, chan, 10.0, &format!("{ts} {chan} 10"), 0)
    }

    fn build(jitter: f64, input: &[(f64, &str)]) -> (Vec<Vec<f64>>, u64) {
        let mut builder = ClusterBuilder::new(jitter);
        let mut clusters = Vec::new();
        for (ts, chan) in input {
            if let Some(cluster) = builder.append_record(rec(*ts, chan)) {
                clusters.push(cluster);
            }
        }
        if let Some(cluster) = builder.flush_final_cluster() {
            clusters.push(cluster);
        }
        let timestamps = clusters
            .iter()
            .map(|c| c.records().iter().map(Record::timestamp).collect())
            .collect();
        (timestamps, builder.singletons())
    }

    #[test]
    fn test_pair_then_singleton() {
        let (clusters, singletons) = build(1.0, &[(0.0, "A"), (0.5, "B"), (3.0, "A")]);
        assert_eq!(clusters, vec![vec![0.0, 0.5]]);
        assert_eq!(singletons, 1);
    }

    #[test]
    fn test_gap_equal_to_jitter_splits() {
        let (clusters, singletons) = build(1.0, &[(0.0, "A"), (1.0, "B")]);
        assert!(clusters.is_empty());
        assert_eq!(singletons, 2);
    }

    #[test]
    fn test_chain_grows_past_jitter() {
        // Every consecutive gap is small even though the cluster spans 2.4
        let (clusters, _) = build(1.0, &[(0.0, "A"), (0.8, "B"), (1.6, "C"), (2.4, "D")]);
        assert_eq!(clusters, vec![vec![0.0, 0.8, 1.6, 2.4]]);
    }

    #[test]
    fn test_closing_record_can_open_next_cluster() {
        let (clusters, singletons) = build(
            1.0,
            &[(0.0, "A"), (0.5, "B"), (5.0, "A"), (5.5, "C"), (9.0, "D")],
        );
        assert_eq!(clusters, vec![vec![0.0, 0.5], vec![5.0, 5.5]]);
        assert_eq!(singletons, 1);
    }

    #[test]
    fn test_final_cluster_is_flushed() {
        let mut builder = ClusterBuilder::new(2.0);
        assert!(builder.append_record(rec(1.0, "A")).is_none());
        assert!(builder.append_record(rec(2.0, "B")).is_none());
        let cluster = builder.flush_final_cluster().unwrap();
        assert_eq!(cluster.len(), 2);
        assert_eq!(cluster.records()[1].timestamp(), 2.0);
        assert!(builder.flush_final_cluster().is_none());
        assert_eq!(builder.singletons(), 0);
    }

    #[test]
    fn test_zero_jitter_never_clusters() {
        let (clusters, singletons) = build(0.0, &[(1.0, "A"), (1.0, "B"), (1.0, "C")]);
        assert!(clusters.is_empty());
        assert_eq!(singletons, 3);
    }

    #[test]
    fn test_empty_stream() {
        let mut builder = ClusterBuilder::new(1.0);
        assert!(builder.flush_final_cluster().is_none());
        assert_eq!(builder.singletons(), 0);
    }
}
