//! Default configuration constants for driftmeasure.
//!
//! Shared by the TOML config layer, the CLI and the validation code so that
//! every entry point agrees on the same baseline.

/// Default capture sample rate in Hz.
///
/// Pulse timing is measured in samples, so a high rate gives finer drift
/// resolution.
pub const SAMPLE_RATE: i64 = 96_000;

/// Default number of captured channels (reference + one measured channel).
pub const NUM_CHANNELS: i64 = 2;

/// Minimum channel count: one reference channel and at least one to compare.
pub const MIN_CHANNELS: i64 = 2;

/// Default index of the channel carrying the reference pulses.
pub const REFERENCE_CHANNEL: i64 = 0;

/// Default normalized amplitude below which peaks are ignored.
pub const PEAK_THRESHOLD: f64 = 0.6;

/// Default pulse length in microseconds.
pub const PULSE_LENGTH_US: i64 = 2000;

/// Default peak detection window in milliseconds.
pub const WINDOW_SIZE_MS: i64 = 500;

/// Default fill value (microseconds) for the `fill-value` undetected peak policy.
pub const UNDETECTED_PEAK_FILL_VALUE_US: i64 = 0;

/// Nanoseconds per microsecond (analysis node time unit is nanoseconds).
pub const NANOS_PER_MICRO: u64 = 1_000;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Raw audio media type used for the capture format filter.
pub const RAW_AUDIO_MEDIA_TYPE: &str = "audio/x-raw";

/// Environment variable naming the capture source.
pub const SOURCE_ENV: &str = "DRIFTMEASURE_SOURCE";

/// Environment variable naming the topology snapshot directory.
pub const DUMP_DIR_ENV: &str = "GST_DEBUG_DUMP_DOT_DIR";
