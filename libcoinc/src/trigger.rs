use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use super::cluster_builder::Cluster;
use super::error::TriggerError;
use super::record::Record;

const COMMENT_MARKER: char = '#';

/// Which records count as adjacent to a given record when checking triggers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Records of the cluster within the jitter of the record itself
    #[default]
    PerEvent,
    /// Every record of the cluster
    ClusterWide,
}

impl FromStr for WindowPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "per_event" {
            Ok(Self::PerEvent)
        } else if s == "cluster_wide" {
            Ok(Self::ClusterWide)
        } else {
            Err(format!("unknown window policy {s:?}"))
        }
    }
}

/// Whether a record must itself be on one of the trigger channels to fire it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
    #[default]
    AnyEvent,
    MembersOnly,
}

impl FromStr for MembershipPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "any_event" {
            Ok(Self::AnyEvent)
        } else if s == "members_only" {
            Ok(Self::MembersOnly)
        } else {
            Err(format!("unknown membership policy {s:?}"))
        }
    }
}

/// A named set of channels that must all be present around a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefinition {
    name: String,
    required_channels: BTreeSet<String>,
}

impl TriggerDefinition {
    pub fn new<I, S>(name: &str, channels: I) -> Result<Self, TriggerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if name.is_empty() {
            return Err(TriggerError::EmptyName(name.to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(TriggerError::BadName(name.to_string()));
        }
        let required_channels: BTreeSet<String> = channels
            .into_iter()
            .map(Into::into)
            .filter(|chan: &String| !chan.is_empty())
            .collect();
        if required_channels.is_empty() {
            return Err(TriggerError::NoChannels(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            required_channels,
        })
    }

    /// Parse a single `<name>:<chan1>,<chan2>,...` rule. Whitespace is ignored anywhere.
    pub fn parse(pattern: &str) -> Result<Self, TriggerError> {
        let compact: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
        let Some((name, channels)) = compact.split_once(':') else {
            return Err(TriggerError::BadPattern(pattern.to_string()));
        };
        if channels.contains(':') {
            return Err(TriggerError::BadPattern(pattern.to_string()));
        }
        if name.is_empty() {
            return Err(TriggerError::EmptyName(pattern.to_string()));
        }
        if channels.split(',').all(str::is_empty) {
            return Err(TriggerError::NoChannels(pattern.to_string()));
        }
        Self::new(name, channels.split(','))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_channels(&self) -> &BTreeSet<String> {
        &self.required_channels
    }

    /// Do all required channels appear among the adjacent ones?
    pub fn is_satisfied_by(&self, adjacent_channels: &FxHashSet<&str>) -> bool {
        self.required_channels
            .iter()
            .all(|chan| adjacent_channels.contains(chan.as_str()))
    }
}

/// The trigger table for a run, keyed and ordered by trigger name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet {
    triggers: BTreeMap<String, TriggerDefinition>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger. A trigger with the same name is replaced and returned.
    pub fn insert(&mut self, trigger: TriggerDefinition) -> Option<TriggerDefinition> {
        self.triggers.insert(trigger.name.clone(), trigger)
    }

    /// Parse pattern lines, skipping blank lines and `#` comments.
    ///
    /// Later rules overwrite earlier rules with the same name.
    pub fn add_patterns<'a, I>(&mut self, lines: I) -> Result<(), TriggerError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for line in lines {
            let pattern = match line.split_once(COMMENT_MARKER) {
                Some((before, _)) => before,
                None => line,
            };
            if pattern.trim().is_empty() {
                continue;
            }
            let trigger = TriggerDefinition::parse(pattern)?;
            if let Some(old) = self.insert(trigger) {
                log::debug!("Channel pattern for trigger {} was overwritten", old.name);
            }
        }
        Ok(())
    }

    /// Read pattern lines from a file
    pub fn add_pattern_file(&mut self, path: &Path) -> Result<(), TriggerError> {
        if !path.exists() {
            return Err(TriggerError::BadFilePath(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        self.add_patterns(contents.lines())
    }

    pub fn from_patterns<'a, I>(lines: I) -> Result<Self, TriggerError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = Self::new();
        set.add_patterns(lines)?;
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&TriggerDefinition> {
        self.triggers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TriggerDefinition> {
        self.triggers.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

/// Names of the triggers fired at one record
pub type FiredTriggers<'t> = BTreeSet<&'t str>;

/// TriggerEvaluator checks every record of a finished Cluster against the trigger table.
///
/// For a record `e` the adjacency window is every record `r` of the cluster with
/// `|r.timestamp - e.timestamp| <= jitter` (or the whole cluster with
/// [`WindowPolicy::ClusterWide`]). A trigger fires at `e` when all of its channels occur in
/// that window.
#[derive(Debug, Clone)]
pub struct TriggerEvaluator<'t> {
    triggers: &'t TriggerSet,
    jitter: f64,
    window: WindowPolicy,
    membership: MembershipPolicy,
}

impl<'t> TriggerEvaluator<'t> {
    pub fn new(
        triggers: &'t TriggerSet,
        jitter: f64,
        window: WindowPolicy,
        membership: MembershipPolicy,
    ) -> Self {
        Self {
            triggers,
            jitter,
            window,
            membership,
        }
    }

    /// Returns the fired triggers for each record, in cluster order
    pub fn evaluate(&self, cluster: &Cluster) -> Vec<FiredTriggers<'t>> {
        let records = cluster.records();
        let cluster_channels = match self.window {
            WindowPolicy::ClusterWide => Some(channels_of(records.iter())),
            WindowPolicy::PerEvent => None,
        };

        records
            .iter()
            .map(|record| {
                let local;
                let adjacent = match &cluster_channels {
                    Some(channels) => channels,
                    None => {
                        local = self.adjacent_channels(records, record);
                        &local
                    }
                };
                self.fired_at(record, adjacent)
            })
            .collect()
    }

    fn adjacent_channels<'r>(&self, records: &'r [Record], record: &Record) -> FxHashSet<&'r str> {
        channels_of(
            records
                .iter()
                .filter(|other| (other.timestamp() - record.timestamp()).abs() <= self.jitter),
        )
    }

    fn fired_at(&self, record: &Record, adjacent: &FxHashSet<&str>) -> FiredTriggers<'t> {
        self.triggers
            .iter()
            .filter(|trigger| match self.membership {
                MembershipPolicy::AnyEvent => true,
                MembershipPolicy::MembersOnly => {
                    trigger.required_channels.contains(record.channel())
                }
            })
            .filter(|trigger| trigger.is_satisfied_by(adjacent))
            .map(TriggerDefinition::name)
            .collect()
    }
}

fn channels_of<'r>(records: impl Iterator<Item = &'r Record>) -> FxHashSet<&'r str> {
    records.map(Record::channel).collect()
}
