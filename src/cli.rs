//! Command-line interface for driftmeasure
//!
//! Provides argument parsing using clap derive macros.

use crate::config::{Config, UndetectedPeakHandling};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Measure clock drift between audio channels
#[derive(Parser, Debug)]
#[command(
    name = "driftmeasure",
    version,
    about = "Measure clock drift between audio channels",
    long_about = "Captures multichannel audio, detects reference pulses and writes the \
                  per-channel drift to a CSV file. Optionally records the raw capture \
                  as WAV. Send SIGINT, SIGHUP or SIGTERM to finish the measurement."
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Capture source (device name) to record from
    #[arg(short = 's', long, value_name = "NAME")]
    pub source_name: Option<String>,

    /// CSV file the drift measurements are written to
    #[arg(short = 'o', long = "output-csv-filename", value_name = "PATH")]
    pub output_csv: Option<PathBuf>,

    /// WAV file the raw capture is recorded to (omit to disable recording)
    #[arg(short = 'w', long = "output-wav-filename", value_name = "PATH")]
    pub output_wav: Option<PathBuf>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, value_name = "HZ")]
    pub sample_rate: Option<i64>,

    /// Number of channels to capture (at least 2)
    #[arg(short = 'c', long, value_name = "N")]
    pub num_channels: Option<i64>,

    /// Channel that carries the reference pulses
    #[arg(long, value_name = "CHANNEL")]
    pub reference_channel: Option<i64>,

    /// Peak detection threshold (0.0 to 1.0)
    #[arg(long, value_name = "THRESHOLD")]
    pub peak_threshold: Option<f64>,

    /// Reference pulse length in microseconds
    #[arg(long, value_name = "MICROSECONDS")]
    pub pulse_length: Option<i64>,

    /// Analysis window size in milliseconds
    #[arg(long, value_name = "MILLISECONDS")]
    pub window_size: Option<i64>,

    /// What to write when a channel shows no peak in a window
    #[arg(long, value_enum, value_name = "MODE")]
    pub undetected_peak_handling: Option<UndetectedPeakHandling>,

    /// Value written for undetected peaks with fill-value handling, in microseconds
    #[arg(long, value_name = "MICROSECONDS", allow_negative_numbers = true)]
    pub undetected_peak_fill_value: Option<i64>,

    /// Write a topology snapshot into this directory on every state change
    #[arg(long, value_name = "PATH")]
    pub dump_dot_dir: Option<PathBuf>,

    /// List available capture sources and exit
    #[arg(long)]
    pub list_available_sources: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available capture sources
    Sources,

    /// Check that every required pipeline element is installed
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Merge flags given on the command line into `config`.
    ///
    /// Only flags that were actually given override the file/env layers.
    pub fn apply_to(&self, config: &mut Config) {
        let capture = &mut config.capture;
        if let Some(source) = &self.source_name {
            capture.source_name = Some(source.clone());
        }
        if let Some(path) = &self.output_csv {
            capture.output_csv_path = Some(path.clone());
        }
        if let Some(path) = &self.output_wav {
            capture.output_wav_path = Some(path.clone());
        }
        if let Some(rate) = self.sample_rate {
            capture.sample_rate_hz = rate;
        }
        if let Some(channels) = self.num_channels {
            capture.num_channels = channels;
        }
        if let Some(channel) = self.reference_channel {
            capture.reference_channel = channel;
        }
        if let Some(threshold) = self.peak_threshold {
            capture.peak_threshold = threshold;
        }
        if let Some(length) = self.pulse_length {
            capture.pulse_length_us = length;
        }
        if let Some(size) = self.window_size {
            capture.window_size_ms = size;
        }
        if let Some(handling) = self.undetected_peak_handling {
            capture.undetected_peak_handling = handling;
        }
        if let Some(fill) = self.undetected_peak_fill_value {
            capture.undetected_peak_fill_value_us = fill;
        }
        if let Some(dir) = &self.dump_dot_dir {
            config.diagnostics.dump_dir = Some(dir.clone());
        }
    }

    /// Returns true if a source listing was requested by flag or subcommand.
    pub fn wants_source_list(&self) -> bool {
        self.list_available_sources || matches!(self.command, Some(Commands::Sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "driftmeasure",
            "-s",
            "alsa_input.usb-0",
            "-o",
            "/tmp/drift.csv",
            "-w",
            "/tmp/drift.wav",
            "-r",
            "48000",
            "-c",
            "4",
            "--reference-channel",
            "3",
            "--peak-threshold",
            "0.25",
            "--pulse-length",
            "1500",
            "--window-size",
            "250",
        ])
        .unwrap();

        assert_eq!(cli.source_name.as_deref(), Some("alsa_input.usb-0"));
        assert_eq!(cli.output_csv, Some(PathBuf::from("/tmp/drift.csv")));
        assert_eq!(cli.output_wav, Some(PathBuf::from("/tmp/drift.wav")));
        assert_eq!(cli.sample_rate, Some(48000));
        assert_eq!(cli.num_channels, Some(4));
        assert_eq!(cli.reference_channel, Some(3));
        assert_eq!(cli.peak_threshold, Some(0.25));
        assert_eq!(cli.pulse_length, Some(1500));
        assert_eq!(cli.window_size, Some(250));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_undetected_peak_options() {
        let cli = Cli::try_parse_from([
            "driftmeasure",
            "--undetected-peak-handling",
            "fill-value",
            "--undetected-peak-fill-value",
            "-100",
        ])
        .unwrap();
        assert_eq!(
            cli.undetected_peak_handling,
            Some(UndetectedPeakHandling::FillValue)
        );
        assert_eq!(cli.undetected_peak_fill_value, Some(-100));
    }

    #[test]
    fn test_invalid_undetected_peak_handling_rejected() {
        let result = Cli::try_parse_from(["driftmeasure", "--undetected-peak-handling", "guess"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["driftmeasure", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_sources_flag_and_command() {
        let cli = Cli::try_parse_from(["driftmeasure", "--list-available-sources"]).unwrap();
        assert!(cli.wants_source_list());

        let cli = Cli::try_parse_from(["driftmeasure", "sources"]).unwrap();
        assert!(cli.wants_source_list());

        let cli = Cli::try_parse_from(["driftmeasure", "check"]).unwrap();
        assert!(!cli.wants_source_list());
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["driftmeasure", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from(["driftmeasure", "check", "--config", "/tmp/config.toml", "-q"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_invalid_command_returns_error() {
        assert!(Cli::try_parse_from(["driftmeasure", "invalid"]).is_err());
    }

    #[test]
    fn test_apply_to_overrides_only_given_flags() {
        let mut config = Config::default();
        config.capture.source_name = Some("from-file".to_string());
        config.capture.sample_rate_hz = 44100;

        let cli = Cli::try_parse_from([
            "driftmeasure",
            "-o",
            "/tmp/drift.csv",
            "--window-size",
            "1000",
            "--dump-dot-dir",
            "/tmp/dots",
        ])
        .unwrap();
        cli.apply_to(&mut config);

        assert_eq!(config.capture.source_name.as_deref(), Some("from-file"));
        assert_eq!(config.capture.sample_rate_hz, 44100);
        assert_eq!(
            config.capture.output_csv_path,
            Some(PathBuf::from("/tmp/drift.csv"))
        );
        assert_eq!(config.capture.window_size_ms, 1000);
        assert_eq!(config.diagnostics.dump_dir, Some(PathBuf::from("/tmp/dots")));
    }

    #[test]
    fn test_apply_to_then_validate() {
        let mut config = Config::default();
        let cli = Cli::try_parse_from([
            "driftmeasure",
            "-s",
            "mic",
            "-o",
            "/tmp/drift.csv",
            "-c",
            "1",
        ])
        .unwrap();
        cli.apply_to(&mut config);
        assert!(config.capture.validate().is_err());
    }
}
