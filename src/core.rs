//! Core data types shared across the acquisition pipeline.
//!
//! This module defines the vocabulary of the system: validated channels, the
//! tagged [`Measurement`] variant that replaces per-site unit branching, the
//! transient [`RawFrame`] produced by the reader, the [`ConvertedSample`]
//! consumed by the series store and the persistence batcher, and the typed
//! [`OutboundCommand`] set rendered to instrument SCPI text.

use crate::error::{AppResult, DaqError};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Number of input channels on the instrument.
pub const CHANNEL_COUNT: usize = 4;

/// Wall-clock format used on the wire and in the durable log
/// (`25/08/2026 14:23:05`).
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Column headers of the daily log file, in on-disk order.
pub const LOG_HEADER: [&str; 5] = [
    "Timestamp",
    "Thermocouple EMF",
    "Thermocouple Temperature",
    "PRT Resistance",
    "PRT Temperature",
];

// =============================================================================
// Channel
// =============================================================================

/// A validated instrument channel number (1 through 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// All channels in ascending order.
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT as u8).map(Channel)
    }

    /// The raw channel number as printed on the instrument front panel.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based index for array storage.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl TryFrom<u8> for Channel {
    type Error = DaqError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=CHANNEL_COUNT as u8).contains(&value) {
            Ok(Channel(value))
        } else {
            Err(DaqError::MalformedFrame(format!(
                "channel {value} outside 1..={CHANNEL_COUNT}"
            )))
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Units and measurements
// =============================================================================

/// Input kind configured per channel: a platinum resistance thermometer
/// reporting ohms, or a Type-S thermocouple reporting millivolts.
///
/// Serialized with the instrument's own tokens (`O` / `MV`) so the
/// configuration file reads like the SCPI commands it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// PRT resistance in ohms.
    #[serde(rename = "O")]
    Resistance,
    /// Thermocouple EMF in millivolts.
    #[serde(rename = "MV")]
    Emf,
}

impl Unit {
    /// Token used by the `UNIT:CHAN<n>` command.
    pub fn scpi_token(self) -> &'static str {
        match self {
            Unit::Resistance => "O",
            Unit::Emf => "MV",
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Resistance
    }
}

/// A raw reading tagged with its physical kind.
///
/// Carrying the tag with the value lets conversion and storage dispatch once
/// via pattern matching instead of re-branching on a unit string at every
/// site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// PRT resistance in ohms.
    Resistance(f64),
    /// Thermocouple EMF in millivolts.
    Emf(f64),
}

impl Measurement {
    /// Tags a raw value with the channel's configured unit.
    pub fn tagged(unit: Unit, value: f64) -> Self {
        match unit {
            Unit::Resistance => Measurement::Resistance(value),
            Unit::Emf => Measurement::Emf(value),
        }
    }

    /// The untagged raw value.
    pub fn value(self) -> f64 {
        match self {
            Measurement::Resistance(v) | Measurement::Emf(v) => v,
        }
    }
}

// =============================================================================
// Frames and samples
// =============================================================================

/// One parsed instrument line: a single channel reading plus the verbatim
/// wall-clock string assembled from the line's date and time tokens.
///
/// Frames are transient; they exist only on the reader → consumer channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Source channel.
    pub channel: Channel,
    /// Tagged raw reading.
    pub measurement: Measurement,
    /// `"<date> <time>"` exactly as received, parseable with
    /// [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
}

/// A fully converted sample: the raw quantity and its calibrated temperature,
/// with the quantities of the other input kind set to NaN.
///
/// Exactly one of the (`emf`, `tc_temp`) and (`resistance`, `prt_temp`) pairs
/// is non-NaN, selected by the frame's [`Measurement`] variant.
#[derive(Debug, Clone)]
pub struct ConvertedSample {
    /// Source channel.
    pub channel: Channel,
    /// Parsed frame timestamp.
    pub timestamp: NaiveDateTime,
    /// Thermocouple EMF in millivolts, or NaN on resistance frames.
    pub emf: f64,
    /// Thermocouple temperature in degrees Celsius, or NaN.
    pub tc_temp: f64,
    /// PRT resistance in ohms, or NaN on EMF frames.
    pub resistance: f64,
    /// PRT temperature in degrees Celsius, or NaN.
    pub prt_temp: f64,
}

impl ConvertedSample {
    /// Selects one quantity by its [`Quantity`] tag.
    pub fn quantity(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Emf => self.emf,
            Quantity::ThermocoupleTemp => self.tc_temp,
            Quantity::Resistance => self.resistance,
            Quantity::PrtTemp => self.prt_temp,
        }
    }

    /// Timestamp rendered back to the on-disk/on-wire format.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Selector for one of the four per-channel series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Thermocouple EMF (mV).
    Emf,
    /// Thermocouple temperature (°C).
    ThermocoupleTemp,
    /// PRT resistance (Ω).
    Resistance,
    /// PRT temperature (°C).
    PrtTemp,
}

// =============================================================================
// Reader events and outbound commands
// =============================================================================

/// Message from the reader thread to the foreground consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// A well-formed frame.
    Frame(RawFrame),
    /// A transient I/O failure; the reader is backing off and retrying.
    Degraded(String),
}

/// Typed outbound instrument command, rendered to one SCPI line.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// `MEAS:PER <period>` — streaming measurement period.
    MeasurePeriod(Duration),
    /// `UNIT:CHAN<n> <O|MV>` — per-channel input kind.
    SetUnit {
        /// Target channel.
        channel: Channel,
        /// New input kind.
        unit: Unit,
    },
    /// `SYST:DATE <dd>,<mm>,<yyyy>` — instrument calendar date.
    SetDate(NaiveDate),
    /// `SYST:TIME <HH>,<MM>,<SS>` — instrument time of day.
    SetTime(NaiveTime),
    /// Collaborator-supplied command text, passed through verbatim.
    Raw(String),
}

impl OutboundCommand {
    /// Renders the command as a single SCPI line without the terminator.
    pub fn to_scpi(&self) -> String {
        match self {
            OutboundCommand::MeasurePeriod(period) => {
                format!("MEAS:PER {}", scpi_period(*period))
            }
            OutboundCommand::SetUnit { channel, unit } => {
                format!("UNIT:CHAN{} {}", channel, unit.scpi_token())
            }
            OutboundCommand::SetDate(date) => format!(
                "SYST:DATE {:02},{:02},{}",
                date.day(),
                date.month(),
                date.year()
            ),
            OutboundCommand::SetTime(time) => format!(
                "SYST:TIME {:02},{:02},{:02}",
                time.hour(),
                time.minute(),
                time.second()
            ),
            OutboundCommand::Raw(text) => text.clone(),
        }
    }
}

/// Renders a duration as the instrument's measurement-period token:
/// sub-minute values in seconds (`0.1`, `1`, `30`), whole minutes as `<n>m`,
/// whole hours as `<n>h`.
fn scpi_period(period: Duration) -> String {
    let secs = period.as_secs();
    if secs >= 3600 && secs % 3600 == 0 && period.subsec_nanos() == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 && period.subsec_nanos() == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}", period.as_secs_f64())
    }
}

// =============================================================================
// Storage seam
// =============================================================================

/// Destination for flushed sample batches.
///
/// The production implementation is the daily CSV log; tests substitute
/// in-memory sinks to exercise the batcher's retention semantics.
pub trait DurableLog {
    /// Persists the rows, merging with any previously persisted content, and
    /// returns the path written.
    ///
    /// # Errors
    ///
    /// Any I/O failure. Callers keep their buffers on error.
    fn append(&self, rows: &[ConvertedSample]) -> AppResult<PathBuf>;
}

// =============================================================================
// Latest-value display cache
// =============================================================================

/// Preformatted display strings for a channel's most recent sample.
///
/// "N/A" where the quantity is NaN, otherwise four decimal places with the
/// unit suffix, matching what the readout panel shows.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestValues {
    /// EMF, e.g. `"9.5870 mV"`.
    pub emf: String,
    /// Thermocouple temperature, e.g. `"1064.1800 °C"`.
    pub tc_temp: String,
    /// Resistance, e.g. `"100.0000 Ω"`.
    pub resistance: String,
    /// PRT temperature, e.g. `"0.0000 °C"`.
    pub prt_temp: String,
}

impl Default for LatestValues {
    fn default() -> Self {
        Self {
            emf: "N/A".to_string(),
            tc_temp: "N/A".to_string(),
            resistance: "N/A".to_string(),
            prt_temp: "N/A".to_string(),
        }
    }
}

impl LatestValues {
    /// Formats a converted sample for display.
    pub fn from_sample(sample: &ConvertedSample) -> Self {
        Self {
            emf: display_value(sample.emf, "mV"),
            tc_temp: display_value(sample.tc_temp, "°C"),
            resistance: display_value(sample.resistance, "Ω"),
            prt_temp: display_value(sample.prt_temp, "°C"),
        }
    }
}

fn display_value(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        "N/A".to_string()
    } else {
        format!("{value:.4} {suffix}")
    }
}
