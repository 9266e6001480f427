//! Property-based tests for the clustering and trigger invariants.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::io::Cursor;

use libcoinc::cluster_builder::Cluster;
use libcoinc::cluster_stream::ClusterStream;
use libcoinc::config::ColumnLayout;
use libcoinc::record::{Record, RecordStream};
use libcoinc::trigger::{
    MembershipPolicy, TriggerDefinition, TriggerEvaluator, TriggerSet, WindowPolicy,
};

const CHANNELS: [&str; 4] = ["A", "B", "C", "D"];

/// Sorted input lines built from positive gaps (in hundredths) between hits
fn input_lines() -> impl Strategy<Value = Vec<(f64, &'static str, f64)>> {
    prop::collection::vec((0u32..300, 0usize..CHANNELS.len(), 0u32..20), 0..60).prop_map(
        |hits| {
            let mut ts = 0u32;
            hits.into_iter()
                .map(|(gap, chan, value)| {
                    ts += gap;
                    (f64::from(ts) / 100.0, CHANNELS[chan], f64::from(value))
                })
                .collect()
        },
    )
}

fn to_text(lines: &[(f64, &str, f64)]) -> String {
    lines
        .iter()
        .map(|(ts, chan, value)| format!("{ts}\t{chan}\t{value}\n"))
        .collect()
}

fn cluster_all(text: &str, jitter: f64, threshold: Option<f64>) -> (Vec<Cluster>, Vec<Record>) {
    let records = RecordStream::new(
        Cursor::new(text.as_bytes().to_vec()),
        ColumnLayout::default(),
        threshold,
    );
    let clusters: Vec<Cluster> = ClusterStream::new(records, jitter)
        .collect::<Result<_, _>>()
        .unwrap();

    let mut all = RecordStream::new(
        Cursor::new(text.as_bytes().to_vec()),
        ColumnLayout::default(),
        threshold,
    );
    let mut accepted = Vec::new();
    while let Some(record) = all.get_next_record().unwrap() {
        accepted.push(record);
    }
    (clusters, accepted)
}

proptest! {
    #[test]
    fn clusters_are_ordered_subsequences_of_the_input(
        lines in input_lines(),
        jitter in 0.0f64..2.0,
    ) {
        let (clusters, accepted) = cluster_all(&to_text(&lines), jitter, None);
        let clustered: Vec<u64> = clusters
            .iter()
            .flat_map(|c| c.records().iter().map(Record::line))
            .collect();

        // No duplicates and original order
        prop_assert!(clustered.windows(2).all(|w| w[0] < w[1]));

        // Every accepted record is either clustered or isolated on both sides
        for (idx, record) in accepted.iter().enumerate() {
            if clustered.contains(&record.line()) {
                continue;
            }
            if idx > 0 {
                prop_assert!(record.timestamp() - accepted[idx - 1].timestamp() >= jitter);
            }
            if idx + 1 < accepted.len() {
                prop_assert!(accepted[idx + 1].timestamp() - record.timestamp() >= jitter);
            }
        }
    }

    #[test]
    fn cluster_boundaries_respect_the_jitter(
        lines in input_lines(),
        jitter in 0.0f64..2.0,
    ) {
        let (clusters, accepted) = cluster_all(&to_text(&lines), jitter, None);
        for cluster in &clusters {
            prop_assert!(cluster.len() >= 2);
            for pair in cluster.records().windows(2) {
                prop_assert!(pair[1].timestamp() - pair[0].timestamp() < jitter);
            }

            let first = cluster.records()[0].line();
            let last = cluster.records()[cluster.len() - 1].line();
            let start = accepted.iter().position(|r| r.line() == first).unwrap();
            let end = accepted.iter().position(|r| r.line() == last).unwrap();
            prop_assert_eq!(end - start + 1, cluster.len());
            if start > 0 {
                prop_assert!(accepted[start].timestamp() - accepted[start - 1].timestamp() >= jitter);
            }
            if end + 1 < accepted.len() {
                prop_assert!(accepted[end + 1].timestamp() - accepted[end].timestamp() >= jitter);
            }
        }
    }

    #[test]
    fn threshold_filter_commutes_with_clustering(
        lines in input_lines(),
        threshold in 0.0f64..20.0,
        jitter in 0.01f64..2.0,
    ) {
        let kept: Vec<_> = lines.iter().copied().filter(|(_, _, v)| *v >= threshold).collect();
        let (with_threshold, _) = cluster_all(&to_text(&lines), jitter, Some(threshold));
        let (prefiltered, _) = cluster_all(&to_text(&kept), jitter, None);

        let raw = |clusters: &[Cluster]| -> Vec<Vec<String>> {
            clusters
                .iter()
                .map(|c| c.records().iter().map(|r| r.raw().to_string()).collect())
                .collect()
        };
        prop_assert_eq!(raw(&with_threshold), raw(&prefiltered));
    }

    #[test]
    fn extra_required_channel_never_fires_more(
        lines in input_lines(),
        jitter in 0.01f64..2.0,
        base in prop::collection::btree_set(0usize..CHANNELS.len(), 1..3),
        extra in 0usize..CHANNELS.len(),
        cluster_wide in any::<bool>(),
    ) {
        let base_channels: BTreeSet<&str> = base.iter().map(|i| CHANNELS[*i]).collect();
        let mut wider = base_channels.clone();
        wider.insert(CHANNELS[extra]);

        let mut narrow_set = TriggerSet::new();
        narrow_set.insert(TriggerDefinition::new("T", base_channels.iter().copied()).unwrap());
        let mut wide_set = TriggerSet::new();
        wide_set.insert(TriggerDefinition::new("T", wider.iter().copied()).unwrap());

        let window = if cluster_wide { WindowPolicy::ClusterWide } else { WindowPolicy::PerEvent };
        let narrow = TriggerEvaluator::new(&narrow_set, jitter, window, MembershipPolicy::AnyEvent);
        let wide = TriggerEvaluator::new(&wide_set, jitter, window, MembershipPolicy::AnyEvent);

        let (clusters, _) = cluster_all(&to_text(&lines), jitter, None);
        for cluster in &clusters {
            for (n, w) in narrow.evaluate(cluster).iter().zip(wide.evaluate(cluster)) {
                prop_assert!(!w.contains("T") || n.contains("T"));
            }
        }
    }
}
