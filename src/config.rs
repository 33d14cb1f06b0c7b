//! Configuration management.
use crate::core::{Unit, CHANNEL_COUNT};
use crate::error::{AppResult, DaqError};
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings, loaded from `config/<name>.toml`.
///
/// Every field has a default so a sparse file (or none, via
/// [`Settings::default`]) yields a working configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log filter passed to the logger at startup.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Serial link parameters.
    #[serde(default)]
    pub serial: SerialSettings,
    /// Acquisition pacing and buffer sizing.
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    /// Durable log location and flush thresholds.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Serial link parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM4`. Must be set (in the file
    /// or on the command line) before a serial session can start.
    #[serde(default)]
    pub port: String,
    /// Line speed in baud.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Blocking read timeout; also bounds cancellation latency.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Instrument turnaround pause between outbound commands.
    #[serde(default = "default_command_gap", with = "humantime_serde")]
    pub command_gap: Duration,
    /// Wait before retrying after a mid-session I/O failure.
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

/// Acquisition pacing and buffer sizing.
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSettings {
    /// Foreground consumer tick period.
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Measurement period commanded at session start (`MEAS:PER`).
    #[serde(default = "default_measure_period", with = "humantime_serde")]
    pub measure_period: Duration,
    /// Rolling-window length per channel per quantity.
    #[serde(default = "default_series_capacity")]
    pub series_capacity: usize,
    /// Bound of the reader → consumer frame queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Input kind per channel, in the instrument's own tokens (`O` / `MV`).
    #[serde(default = "default_channel_units")]
    pub channel_units: [Unit; CHANNEL_COUNT],
}

/// Durable log location and flush thresholds.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory holding the daily log files.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Daily file name prefix (`<prefix>_<YYYYMMDD>.csv`).
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Flush once this many records are buffered.
    #[serde(default = "default_flush_records")]
    pub flush_records: usize,
    /// Flush a non-empty buffer after this long without one.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_command_gap() -> Duration {
    Duration::from_millis(100)
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_measure_period() -> Duration {
    Duration::from_secs(1)
}

fn default_series_capacity() -> usize {
    300
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_channel_units() -> [Unit; CHANNEL_COUNT] {
    [Unit::Resistance; CHANNEL_COUNT]
}

fn default_save_dir() -> PathBuf {
    dirs::desktop_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_file_prefix() -> String {
    "fluke1529".to_string()
}

fn default_flush_records() -> usize {
    60
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(300)
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout: default_read_timeout(),
            command_gap: default_command_gap(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            measure_period: default_measure_period(),
            series_capacity: default_series_capacity(),
            queue_capacity: default_queue_capacity(),
            channel_units: default_channel_units(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            file_prefix: default_file_prefix(),
            flush_records: default_flush_records(),
            flush_interval: default_flush_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            serial: SerialSettings::default(),
            acquisition: AcquisitionSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Loads `config/<name>.toml`, or `config/default.toml` when no name is
    /// given.
    ///
    /// # Errors
    ///
    /// [`DaqError::Config`] when the file is missing or malformed.
    pub fn new(config_name: Option<&str>) -> Result<Self, DaqError> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(DaqError::Config)?;

        s.try_deserialize().map_err(DaqError::Config)
    }

    /// Rejects values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidParameter`] naming the offending field.
    pub fn validate(&self) -> AppResult<()> {
        if self.acquisition.series_capacity == 0 {
            return Err(DaqError::InvalidParameter(
                "acquisition.series_capacity must be at least 1".to_string(),
            ));
        }
        if self.acquisition.queue_capacity == 0 {
            return Err(DaqError::InvalidParameter(
                "acquisition.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.acquisition.tick_interval.is_zero() {
            return Err(DaqError::InvalidParameter(
                "acquisition.tick_interval must be positive".to_string(),
            ));
        }
        if self.acquisition.measure_period.is_zero() {
            return Err(DaqError::InvalidParameter(
                "acquisition.measure_period must be positive".to_string(),
            ));
        }
        if self.storage.flush_records == 0 {
            return Err(DaqError::InvalidParameter(
                "storage.flush_records must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.acquisition.series_capacity, 300);
        assert_eq!(settings.storage.flush_records, 60);
        assert_eq!(settings.storage.file_prefix, "fluke1529");
        assert_eq!(
            settings.acquisition.channel_units,
            [Unit::Resistance; CHANNEL_COUNT]
        );
    }

    #[test]
    fn sparse_toml_fills_in_defaults() {
        let toml = r#"
            log_level = "debug"

            [serial]
            port = "/dev/ttyS5"

            [acquisition]
            tick_interval = "250ms"
            channel_units = ["O", "MV", "O", "O"]

            [storage]
            flush_interval = "5m"
        "#;
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.serial.port, "/dev/ttyS5");
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.acquisition.tick_interval, Duration::from_millis(250));
        assert_eq!(settings.acquisition.channel_units[1], Unit::Emf);
        assert_eq!(settings.storage.flush_interval, Duration::from_secs(300));
        assert_eq!(settings.storage.flush_records, 60);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.series_capacity = 0;
        assert!(matches!(
            settings.validate(),
            Err(DaqError::InvalidParameter(_))
        ));
    }
}
