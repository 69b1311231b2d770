//! Configuration layers and the validated capture model.
//!
//! [`Config`] is what users write (TOML file, environment, CLI flags). It is
//! turned into an immutable [`CaptureConfig`] by [`CaptureSettings::validate`];
//! the pipeline only ever sees the validated form.

use crate::defaults;
use crate::error::{DriftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub diagnostics: DiagnosticsConfig,
}

/// Unvalidated capture parameters, as read from file/env/CLI.
///
/// Numeric fields are signed so that out-of-range input reaches validation
/// instead of failing in the parser with a less helpful message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub source_name: Option<String>,
    pub output_csv_path: Option<PathBuf>,
    pub output_wav_path: Option<PathBuf>,
    pub sample_rate_hz: i64,
    pub num_channels: i64,
    pub reference_channel: i64,
    pub peak_threshold: f64,
    pub pulse_length_us: i64,
    pub window_size_ms: i64,
    pub undetected_peak_handling: UndetectedPeakHandling,
    pub undetected_peak_fill_value_us: i64,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Directory for topology snapshots; `None` disables them.
    pub dump_dir: Option<PathBuf>,
}

/// What the analysis node writes when a non-reference channel shows no peak.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum UndetectedPeakHandling {
    /// Leave the CSV column empty
    #[default]
    NoValue,
    /// Repeat the last detected value
    LastValue,
    /// Write the configured fill value
    FillValue,
}

impl UndetectedPeakHandling {
    /// Enum nick understood by the analysis node.
    pub fn nick(self) -> &'static str {
        match self {
            UndetectedPeakHandling::NoValue => "no-value",
            UndetectedPeakHandling::LastValue => "last-value",
            UndetectedPeakHandling::FillValue => "fill-value",
        }
    }
}

impl fmt::Display for UndetectedPeakHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nick())
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source_name: None,
            output_csv_path: None,
            output_wav_path: None,
            sample_rate_hz: defaults::SAMPLE_RATE,
            num_channels: defaults::NUM_CHANNELS,
            reference_channel: defaults::REFERENCE_CHANNEL,
            peak_threshold: defaults::PEAK_THRESHOLD,
            pulse_length_us: defaults::PULSE_LENGTH_US,
            window_size_ms: defaults::WINDOW_SIZE_MS,
            undetected_peak_handling: UndetectedPeakHandling::default(),
            undetected_peak_fill_value_us: defaults::UNDETECTED_PEAK_FILL_VALUE_US,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file doesn't exist.
    ///
    /// Malformed files are still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(DriftError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DRIFTMEASURE_SOURCE → capture.source_name
    /// - GST_DEBUG_DUMP_DOT_DIR → diagnostics.dump_dir
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(source) = lookup(defaults::SOURCE_ENV)
            && !source.is_empty()
        {
            self.capture.source_name = Some(source);
        }

        if let Some(dir) = lookup(defaults::DUMP_DIR_ENV)
            && !dir.is_empty()
        {
            self.diagnostics.dump_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/driftmeasure/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("driftmeasure").join("config.toml"))
    }
}

fn invalid(key: &str, message: String) -> DriftError {
    DriftError::ConfigInvalidValue {
        key: key.to_string(),
        message,
    }
}

impl CaptureSettings {
    /// Validate the settings and produce the immutable capture model.
    pub fn validate(&self) -> Result<CaptureConfig> {
        let source_name = match self.source_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(invalid(
                    "source_name",
                    "a capture source name is required".to_string(),
                ));
            }
        };

        let output_csv_path = match &self.output_csv_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => {
                return Err(invalid(
                    "output_csv_path",
                    "an output CSV path is required".to_string(),
                ));
            }
        };

        // An empty WAV path means the same as none at all.
        let output_wav_path = self
            .output_wav_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
            .cloned();

        if self.sample_rate_hz < 1 {
            return Err(invalid(
                "sample_rate_hz",
                format!("invalid sample rate of {} Hz", self.sample_rate_hz),
            ));
        }
        let sample_rate_hz = i32::try_from(self.sample_rate_hz).map_err(|_| {
            invalid(
                "sample_rate_hz",
                format!("sample rate of {} Hz is too large", self.sample_rate_hz),
            )
        })? as u32;

        if self.num_channels < defaults::MIN_CHANNELS {
            return Err(invalid(
                "num_channels",
                format!(
                    "invalid number of channels: {} (must be at least {})",
                    self.num_channels,
                    defaults::MIN_CHANNELS
                ),
            ));
        }
        let num_channels = i32::try_from(self.num_channels).map_err(|_| {
            invalid(
                "num_channels",
                format!("number of channels {} is too large", self.num_channels),
            )
        })? as u32;

        if self.reference_channel < 0 || self.reference_channel >= self.num_channels {
            return Err(invalid(
                "reference_channel",
                format!(
                    "invalid reference channel: {} (must be in the range 0 - {})",
                    self.reference_channel,
                    self.num_channels - 1
                ),
            ));
        }
        let reference_channel = self.reference_channel as u32;

        if !(0.0..=1.0).contains(&self.peak_threshold) {
            return Err(invalid(
                "peak_threshold",
                format!(
                    "invalid peak threshold: {} (must be in the range 0.0 - 1.0)",
                    self.peak_threshold
                ),
            ));
        }

        if self.pulse_length_us < 1 {
            return Err(invalid(
                "pulse_length_us",
                format!(
                    "invalid pulse length of {} us (must be at least 1)",
                    self.pulse_length_us
                ),
            ));
        }
        let pulse_length_ns = (self.pulse_length_us as u64)
            .checked_mul(defaults::NANOS_PER_MICRO)
            .ok_or_else(|| {
                invalid(
                    "pulse_length_us",
                    format!("pulse length of {} us is too large", self.pulse_length_us),
                )
            })?;

        if self.window_size_ms < 1 {
            return Err(invalid(
                "window_size_ms",
                format!(
                    "invalid window size of {} ms (must be at least 1)",
                    self.window_size_ms
                ),
            ));
        }
        let window_size_ns = (self.window_size_ms as u64)
            .checked_mul(defaults::NANOS_PER_MILLI)
            .ok_or_else(|| {
                invalid(
                    "window_size_ms",
                    format!("window size of {} ms is too large", self.window_size_ms),
                )
            })?;

        let undetected_peak_fill_value_ns = self
            .undetected_peak_fill_value_us
            .checked_mul(defaults::NANOS_PER_MICRO as i64)
            .ok_or_else(|| {
                invalid(
                    "undetected_peak_fill_value_us",
                    format!(
                        "fill value of {} us is out of range",
                        self.undetected_peak_fill_value_us
                    ),
                )
            })?;

        Ok(CaptureConfig {
            source_name,
            output_csv_path,
            output_wav_path,
            sample_rate_hz,
            num_channels,
            reference_channel,
            peak_threshold: self.peak_threshold as f32,
            pulse_length_us: self.pulse_length_us as u64,
            pulse_length_ns,
            window_size_ms: self.window_size_ms as u64,
            window_size_ns,
            undetected_peak_handling: self.undetected_peak_handling,
            undetected_peak_fill_value_ns,
        })
    }
}

/// Validated, immutable capture parameters.
///
/// Only obtainable through [`CaptureSettings::validate`], so holding one
/// means every invariant already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    source_name: String,
    output_csv_path: PathBuf,
    output_wav_path: Option<PathBuf>,
    sample_rate_hz: u32,
    num_channels: u32,
    reference_channel: u32,
    peak_threshold: f32,
    pulse_length_us: u64,
    pulse_length_ns: u64,
    window_size_ms: u64,
    window_size_ns: u64,
    undetected_peak_handling: UndetectedPeakHandling,
    undetected_peak_fill_value_ns: i64,
}

impl CaptureConfig {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn output_csv_path(&self) -> &Path {
        &self.output_csv_path
    }

    /// `None` disables the recording branch.
    pub fn output_wav_path(&self) -> Option<&Path> {
        self.output_wav_path.as_deref()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn num_channels(&self) -> u32 {
        self.num_channels
    }

    pub fn reference_channel(&self) -> u32 {
        self.reference_channel
    }

    pub fn peak_threshold(&self) -> f32 {
        self.peak_threshold
    }

    pub fn pulse_length_us(&self) -> u64 {
        self.pulse_length_us
    }

    /// Pulse length in the analysis node's native unit (nanoseconds).
    pub fn pulse_length_ns(&self) -> u64 {
        self.pulse_length_ns
    }

    pub fn window_size_ms(&self) -> u64 {
        self.window_size_ms
    }

    /// Window size in the analysis node's native unit (nanoseconds).
    pub fn window_size_ns(&self) -> u64 {
        self.window_size_ns
    }

    pub fn undetected_peak_handling(&self) -> UndetectedPeakHandling {
        self.undetected_peak_handling
    }

    pub fn undetected_peak_fill_value_ns(&self) -> i64 {
        self.undetected_peak_fill_value_ns
    }

    /// Human-readable configuration summary, one `(label, value)` per row.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let wav = match &self.output_wav_path {
            Some(path) => format!("\"{}\"", path.display()),
            None => "<WAV output disabled>".to_string(),
        };
        vec![
            ("Source name", format!("\"{}\"", self.source_name)),
            (
                "Output CSV filename",
                format!("\"{}\"", self.output_csv_path.display()),
            ),
            ("Output WAV filename", wav),
            ("Sample rate", format!("{} Hz", self.sample_rate_hz)),
            ("Number of channels", self.num_channels.to_string()),
            ("Reference channel", self.reference_channel.to_string()),
            ("Peak threshold", self.peak_threshold.to_string()),
            ("Pulse length", format!("{} us", self.pulse_length_us)),
            ("Window size", format!("{} ms", self.window_size_ms)),
            (
                "Undetected peaks",
                self.undetected_peak_handling.nick().to_string(),
            ),
        ]
    }
}
