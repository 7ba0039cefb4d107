//! Command line arguments
//!
//! Only process-level concerns live here; scan behaviour is configured through
//! the TOML configuration file.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "imagegate")]
#[command(about = "Scan a batch of container images and report the non-compliant ones")]
#[command(version = crate::core::version::long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Image list to scan, '-' for stdin
    #[arg(short = 'i', long = "images", value_name = "FILE", default_value = "-")]
    pub images: PathBuf,

    /// Where to write the scan results, '-' for stdout
    #[arg(short = 'O', long = "output", value_name = "FILE", default_value = "-")]
    pub output: PathBuf,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity (repeatable)
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Force coloured log output
    #[arg(short = 'g', long = "color", conflicts_with = "no_color")]
    pub color: bool,

    /// Disable coloured log output
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Args {
    /// -v/-q balance, positive towards trace
    pub fn verbosity(&self) -> i8 {
        (self.verbose.min(i8::MAX as u8) as i8).saturating_sub(self.quiet.min(i8::MAX as u8) as i8)
    }

    /// Resolve colour from the flags and whether stderr is a terminal
    pub fn use_color(&self, is_terminal: bool) -> bool {
        !self.no_color && (self.color || is_terminal)
    }

    /// Log file to open, treating 'none' as no file
    pub fn log_file_path(&self) -> Option<String> {
        self.log_file
            .as_ref()
            .filter(|p| !p.as_os_str().eq_ignore_ascii_case("none"))
            .map(|p| p.to_string_lossy().into_owned())
    }
}
