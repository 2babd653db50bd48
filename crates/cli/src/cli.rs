use clap::{ArgAction, Args, Parser};
use config::{Config, WarnedType};
use orchestrator::{ScanTarget, TargetSelection};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

/// pedump: dumps PE image structures from processes and files
///
/// Walks the headers, sections, imports, exports, relocations and TLS data
/// of PE images, either loaded in a running process or on disk, and reports
/// what looks suspicious or unsupported.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only scan PE images found in process memory.
    #[arg(long)]
    pub memonly: bool,

    /// Suppress all normal output. Warned files are still collected.
    #[arg(long)]
    pub quiet: bool,

    /// Dump printable strings found in each image. Ignored with --quiet.
    #[arg(long)]
    pub strings: bool,

    /// Collect warned files and print them at the end of the run.
    #[arg(long)]
    pub warned: bool,

    /// Write warned files to this file instead of standard output. Needs
    /// --warned to collect anything.
    #[arg(long, value_name = "FILE")]
    pub warned_file: Option<PathBuf>,

    /// Append warned files to --warned-file as they are found.
    #[arg(long, requires = "warned_file")]
    pub warned_file_dynamic: bool,

    /// Which warnings to collect: suspicious, unsupported or all.
    #[arg(long, value_name = "TYPE", value_parser = parse_warned_type)]
    pub warned_type: Option<WarnedType>,

    /// Worker threads for file scans.
    #[arg(long, value_parser = validate_positive)]
    pub threads: Option<usize>,

    /// Queued jobs allowed per worker thread.
    #[arg(long, value_parser = validate_positive)]
    pub queue_factor: Option<usize>,

    /// Path to configuration file.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub dump_config: bool,

    /// Increase logging verbosity. Repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Args, Clone, Default)]
pub struct TargetArgs {
    /// Dump the process with this ID.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Dump the first process with this image name.
    #[arg(long)]
    pub name: Option<String>,

    /// Scan a file, or every file below a directory. Repeatable.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Dump every thread and process, then scan the volume holding pedump.
    #[arg(long)]
    pub all: bool,
}

impl Cli {
    /// Log level for the stderr subscriber. Warnings by default.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Overlay command line flags onto a loaded config.
    pub fn apply(&self, config: &mut Config) {
        config.scan.memonly |= self.memonly;
        config.scan.quiet |= self.quiet;
        config.scan.strings |= self.strings;

        let warnings = &mut config.warnings;
        warnings.enabled |= self.warned;
        if let Some(file) = &self.warned_file {
            warnings.file = Some(file.clone());
        }
        warnings.dynamic |= self.warned_file_dynamic;
        if let Some(warned_type) = self.warned_type {
            warnings.warned_type = warned_type;
        }

        if let Some(threads) = self.threads {
            config.scheduler.threads = threads;
        }
        if let Some(queue_factor) = self.queue_factor {
            config.scheduler.queue_factor = queue_factor;
        }
    }

    pub fn target(&self) -> Result<ScanTarget, orchestrator::Error> {
        let TargetArgs {
            pid,
            name,
            paths,
            all,
        } = self.target.clone();
        ScanTarget::from_selection(TargetSelection {
            pid,
            name,
            paths,
            all,
        })
    }
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn validate_positive(value: &str) -> Result<usize, String> {
    let value: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a valid number"))?;
    if value == 0 {
        Err("Value must be at least 1".to_string())
    } else {
        Ok(value)
    }
}

fn parse_warned_type(value: &str) -> Result<WarnedType, String> {
    value.parse().map_err(|err: config::Error| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pedump").chain(args.iter().copied()))
    }

    #[test]
    fn paths_are_repeatable() {
        let cli = parse(&["--path", "a.dll", "--path", "b.exe"]).unwrap();
        assert_eq!(
            cli.target().unwrap(),
            ScanTarget::Paths(vec!["a.dll".into(), "b.exe".into()])
        );
    }

    #[test]
    fn conflicting_targets_are_rejected() {
        let cli = parse(&["--pid", "4", "--all"]).unwrap();
        assert!(matches!(
            cli.target(),
            Err(orchestrator::Error::AmbiguousTarget(_))
        ));
        let cli = parse(&[]).unwrap();
        assert!(matches!(cli.target(), Err(orchestrator::Error::NoTarget)));
    }

    #[test]
    fn unknown_warned_type_is_rejected() {
        assert!(parse(&["--all", "--warned-type", "loud"]).is_err());
        let cli = parse(&["--all", "--warned-type", "Suspicious"]).unwrap();
        assert_eq!(cli.warned_type, Some(WarnedType::Suspicious));
    }

    #[test]
    fn dynamic_requires_a_file() {
        assert!(parse(&["--all", "--warned-file-dynamic"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "--all",
            "--quiet",
            "--warned",
            "--warned-file",
            "warned.txt",
            "--threads",
            "8",
        ])
        .unwrap();
        let mut config = Config::default();
        config.scheduler.queue_factor = 3;
        cli.apply(&mut config);

        assert!(config.scan.quiet);
        assert!(config.warnings.enabled);
        assert_eq!(config.warnings.file, Some(PathBuf::from("warned.txt")));
        assert_eq!(config.scheduler.threads, 8);
        assert_eq!(config.scheduler.queue_factor, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn warned_file_alone_collects_nothing() {
        let cli = parse(&["--all", "--warned-file", "warned.txt"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(!config.warnings.enabled);
        assert_eq!(config.warnings.file, Some(PathBuf::from("warned.txt")));
    }

    #[test]
    fn verbosity_saturates_at_trace() {
        assert_eq!(parse(&["--all"]).unwrap().log_level(), LevelFilter::WARN);
        assert_eq!(parse(&["--all", "-vv"]).unwrap().log_level(), LevelFilter::DEBUG);
        assert_eq!(parse(&["--all", "-vvvvv"]).unwrap().log_level(), LevelFilter::TRACE);
    }

    proptest! {
        #[test]
        fn positive_counts_parse(n in 1usize..10_000) {
            prop_assert_eq!(validate_positive(&n.to_string()), Ok(n));
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(parse(&["--all", "--threads", "0"]).is_err());
    }
}
