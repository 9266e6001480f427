//! # coinc
//!
//! coinc finds coincident events in the data stream of a cosmic-ray monitor, written in
//! Rust. It takes a text stream of detector hits sorted by timestamp, groups hits that are
//! close in time into clusters, checks each cluster against a set of channel patterns
//! (triggers), and copies every hit that fired a trigger into that trigger's output file.
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./coinc_cli` from the top level
//! repository. The binary will be installed to your cargo install location (typically
//! something like `~/.cargo/bin/`).
//!
//! ## Input
//!
//! One record per line, fields separated by any whitespace (tabs recommended):
//!
//! ```text
//! <timestamp> <channel> <value> [<...extra fields ignored>]
//! ```
//!
//! Lines starting with `#` are comments. The input *must* be sorted by timestamp; several
//! data files can be joined with `sort --numeric-sort --merge data1.txt data2.txt ...`.
//! An unsorted line stops the run with an error naming the line. Which column holds each
//! field can be changed in the configuration.
//!
//! ## Clustering
//!
//! Two consecutive records are coincident when their timestamps differ by *less* than the
//! jitter. A cluster is a maximal run of coincident records; a gap equal to the jitter
//! starts a new cluster. Records coincident with nothing are counted and skipped.
//!
//! ## Triggers
//!
//! Triggers are given one per line as
//!
//! ```text
//! <trigger_name>:<chan1>,<chan2>,...,<chanN>
//! ```
//!
//! Whitespace is ignored, `#` starts a comment, and a later rule with the same name
//! replaces an earlier one. A trigger fires at a record when all of its channels appear
//! among the records of the cluster within the jitter of that record.
//!
//! ## Configuration
//!
//! Configurations are YAML files which can be generated with `coinc_cli new -p <path>`:
//!
//! ```yml
//! input_path: null
//! output_prefix: out/coinc_
//! jitter: 1.0
//! threshold: null
//! columns:
//!   timestamp: 0
//!   channel: 1
//!   value: 2
//! patterns: []
//! pattern_file: null
//! window: per_event
//! membership: any_event
//! dump_clusters: false
//! print_stats: false
//! show_progress: false
//! debug: false
//! ```
//!
//! ## Output
//!
//! One file per trigger, named `<output_prefix><trigger_name>.txt`, holding the matched
//! input lines in their original order, once per firing.
pub mod cluster_builder;
pub mod cluster_stream;
pub mod config;
pub mod error;
pub mod process;
pub mod progress;
pub mod record;
pub mod sink;
pub mod statistics;
pub mod trigger;
