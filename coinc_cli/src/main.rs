use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use libcoinc::config::{ColumnLayout, Config};
use libcoinc::process::{load_triggers, process};
use libcoinc::progress::Progress;
use libcoinc::trigger::{MembershipPolicy, WindowPolicy};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

fn make_template_config(path: &Path) -> Result<(), String> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).map_err(|e| e.to_string())?;
    let mut file = File::create(path).map_err(|e| e.to_string())?;
    file.write_all(yaml_str.as_bytes())
        .map_err(|e| e.to_string())
}

fn build_cli() -> Command {
    Command::new("coinc_cli")
        .about("Find coincident events in a time-sorted data stream which match specified triggers")
        .after_help(
            "Input lines: <timestamp> <channel> <value> [...], sorted by timestamp.\n\
             Join several files with `sort --numeric-sort --merge data1.txt data2.txt ...`\n\
             Example: pv -c sorted.txt | coinc_cli -p triggers.txt --jitter=2.0 --stats",
        )
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the file"),
                ),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("load a YAML configuration; other flags override its values"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_parser(value_parser!(PathBuf))
                .help("input from a file (stdin by default)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .help("a path for output, one file per trigger ('out/coinc_' by default)"),
        )
        .arg(
            Arg::new("chan-pattern")
                .short('c')
                .long("chan-pattern")
                .value_name("PATTERN")
                .action(ArgAction::Append)
                .help("a rule for the combinations trigger, <name>:<ch1>,<ch2>,...<chN>, e.g. trigA:1,2,8,9"),
        )
        .arg(
            Arg::new("pattern-file")
                .short('p')
                .long("pattern-file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("read channel patterns from a file, one per line"),
        )
        .arg(
            Arg::new("jitter")
                .short('j')
                .long("jitter")
                .value_name("DIFF")
                .value_parser(value_parser!(f64))
                .help("maximal timestamp difference in coincidence (default: 1.0)"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .value_name("VALUE")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("skip a line when its value is less than threshold"),
        )
        .arg(
            Arg::new("fields")
                .long("fields")
                .value_name("TS,CHAN,VAL")
                .value_parser(|s: &str| s.parse::<ColumnLayout>().map_err(|e| e.to_string()))
                .help("column numbers of the timestamp, channel and value (0,1,2 by default)"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .value_parser(|s: &str| s.parse::<WindowPolicy>())
                .help("records adjacent to a record: per_event (default) or cluster_wide"),
        )
        .arg(
            Arg::new("members-only")
                .long("members-only")
                .action(ArgAction::SetTrue)
                .help("a record only fires triggers that list its own channel"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("print some counters afterwards"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("print some progress"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("be verbose"),
        )
        .arg(
            Arg::new("coinc")
                .long("coinc")
                .action(ArgAction::SetTrue)
                .help("print clusters of records with close timestamps to stdout instead of evaluating triggers"),
        )
}

/// Flags given on the command line win over the loaded config
fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(path) = matches.get_one::<PathBuf>("file") {
        config.input_path = Some(path.clone());
    }
    if let Some(prefix) = matches.get_one::<String>("output") {
        config.output_prefix = prefix.clone();
    }
    if let Some(patterns) = matches.get_many::<String>("chan-pattern") {
        config.patterns.extend(patterns.cloned());
    }
    if let Some(path) = matches.get_one::<PathBuf>("pattern-file") {
        config.pattern_file = Some(path.clone());
    }
    if let Some(jitter) = matches.get_one::<f64>("jitter") {
        config.jitter = *jitter;
    }
    if let Some(threshold) = matches.get_one::<f64>("threshold") {
        config.threshold = Some(*threshold);
    }
    if let Some(columns) = matches.get_one::<ColumnLayout>("fields") {
        config.columns = *columns;
    }
    if let Some(window) = matches.get_one::<WindowPolicy>("window") {
        config.window = *window;
    }
    if matches.get_flag("members-only") {
        config.membership = MembershipPolicy::MembersOnly;
    }
    config.print_stats |= matches.get_flag("stats");
    config.show_progress |= matches.get_flag("progress");
    config.debug |= matches.get_flag("debug");
    config.dump_clusters |= matches.get_flag("coinc");
}

/// Input that marks when the main thread is blocked waiting for data.
///
/// The flag is only flipped under its lock, so a thread holding the lock while the flag is set
/// knows no output is being written until it lets go.
struct WatchedInput<R> {
    inner: R,
    waiting: Arc<Mutex<bool>>,
}

impl<R> WatchedInput<R> {
    fn new(inner: R, waiting: Arc<Mutex<bool>>) -> Self {
        Self { inner, waiting }
    }

    fn set_waiting(&self, value: bool) {
        *self.waiting.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl<R: Read> Read for WatchedInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.set_waiting(true);
        let result = self.inner.read(buf);
        self.set_waiting(false);
        result
    }
}

/// Check that the run has something to do before touching the input
fn has_work(config: &Config) -> Result<bool, String> {
    if config.dump_clusters {
        return Ok(true);
    }
    if !config.has_patterns() {
        return Ok(false);
    }
    let triggers = load_triggers(config).map_err(|e| e.to_string())?;
    Ok(!triggers.is_empty())
}

/// Open the input and make a matching progress bar
fn open_input(
    config: &Config,
    waiting: Arc<Mutex<bool>>,
) -> Result<(Box<dyn BufRead>, ProgressBar), String> {
    match &config.input_path {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("Could not open input {}: {e}", path.display()))?;
            let size = file.metadata().map(|m| m.len()).unwrap_or(0);
            log::info!(
                "Input: {} ({})",
                path.display(),
                human_bytes::human_bytes(size as f64)
            );
            let pb = ProgressBar::new(size);
            if let Ok(style) = ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta}) {msg}",
            ) {
                pb.set_style(style);
            }
            Ok((
                Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)),
                pb,
            ))
        }
        None => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(String::from(
                    "You are trying to read data from a terminal! Use --file or a pipe.",
                ));
            }
            log::info!("Input: <stdin>");
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bytes} read {msg}")
            {
                pb.set_style(style);
            }
            Ok((
                Box::new(BufReader::with_capacity(
                    READ_BUFFER_SIZE,
                    WatchedInput::new(stdin, waiting),
                )),
                pb,
            ))
        }
    }
}

fn main() -> ExitCode {
    // Create a cli
    let matches = build_cli().get_matches();

    let debug = matches.get_flag("debug");
    let level = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    // Initialize feedback. Diagnostics go to stderr, stdout is reserved for cluster dumps.
    // The logger itself lets everything through; the max level does the filtering
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .is_err()
    {
        eprintln!("Could not create logging/progress!");
        return ExitCode::FAILURE;
    }
    log::set_max_level(level);

    if let Some(("new", sub_matches)) = matches.subcommand() {
        if let Some(path) = sub_matches.get_one::<PathBuf>("path") {
            log::info!("Making a template config at {}...", path.to_string_lossy());
            if let Err(e) = make_template_config(path) {
                log::error!("Failed to write template config: {e}");
                return ExitCode::FAILURE;
            }
            log::info!("Done.");
        }
        return ExitCode::SUCCESS;
    }

    // Load our config
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            log::info!("Loading config from {}...", path.to_string_lossy());
            match Config::read_config_file(path) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("{e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &matches);
    if config.debug && !debug {
        log::set_max_level(simplelog::LevelFilter::Debug);
    }
    log::debug!("Running with {:?}", config);

    match has_work(&config) {
        Ok(true) => (),
        Ok(false) => {
            log::warn!("No channel patterns were configured, nothing to do.");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    // First Ctrl+C asks the pipeline to stop. A second one leaves right away, but only while
    // the pipeline is blocked on input, so no output line is cut short
    let interrupt = Arc::new(AtomicBool::new(false));
    let waiting = Arc::new(Mutex::new(false));
    let handler_flag = interrupt.clone();
    let handler_waiting = waiting.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if !handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\nYou pressed Ctrl+C!");
            return;
        }
        let waiting = handler_waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *waiting {
            std::process::exit(0);
        }
    }) {
        log::warn!("Could not install the interrupt handler: {e}");
    }

    let (input, pb) = match open_input(&config, waiting) {
        Ok(opened) => opened,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let pb = if config.show_progress {
        pb_manager.add(pb)
    } else {
        ProgressBar::hidden()
    };

    let stdout = std::io::stdout();
    let dump_out = BufWriter::new(stdout.lock());
    let result = process(
        &config,
        input,
        dump_out,
        &interrupt,
        |progress: &Progress| {
            pb.set_position(progress.bytes_read);
            pb.set_message(format!(
                "{} clusters, {} lines written",
                progress.clusters, progress.lines_written
            ));
        },
    );
    pb.finish();

    match result {
        Ok(stats) => {
            if stats.interrupted {
                log::warn!("Interrupted, output files hold everything up to the last cluster.");
            }
            if config.report_stats() {
                for line in stats.to_string().lines() {
                    log::info!("{line}");
                }
            } else {
                log::info!(
                    "Done: {} clusters, {} lines written.",
                    stats.clusters,
                    stats.lines_written
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
