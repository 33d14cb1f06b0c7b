//! Instrument transport and protocol handling.
pub mod fluke1529;
pub mod mock;

use crate::error::AppResult;
use std::io::{Read, Write};
use std::time::Duration;

/// Line-oriented byte transport driven by the frame reader.
///
/// Blanket-implemented for anything that can read and write bytes on a
/// dedicated thread, so the reader runs against a real serial port or an
/// in-memory double alike. Dropping the transport closes it.
pub trait LinePort: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> LinePort for T {}

/// Opens the instrument's serial port with the given read timeout.
///
/// # Errors
///
/// [`DaqError::Connection`](crate::error::DaqError::Connection) when the port
/// cannot be opened (missing, in use, or permission denied).
#[cfg(feature = "instrument_serial")]
pub fn open_serial(
    port: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> AppResult<Box<dyn LinePort>> {
    let handle = serialport::new(port, baud_rate)
        .timeout(read_timeout)
        .open()
        .map_err(|e| {
            crate::error::DaqError::Connection(format!("failed to open '{}': {}", port, e))
        })?;
    log::info!("Opened serial port '{}' at {} baud.", port, baud_rate);
    Ok(Box::new(handle))
}

#[cfg(not(feature = "instrument_serial"))]
pub fn open_serial(
    _port: &str,
    _baud_rate: u32,
    _read_timeout: Duration,
) -> AppResult<Box<dyn LinePort>> {
    Err(crate::error::DaqError::FeatureNotEnabled(
        "instrument_serial".to_string(),
    ))
}

/// Names of the serial ports visible on this machine.
///
/// # Errors
///
/// [`DaqError::Connection`](crate::error::DaqError::Connection) when
/// enumeration itself fails.
#[cfg(feature = "instrument_serial")]
pub fn list_ports() -> AppResult<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| {
        crate::error::DaqError::Connection(format!("failed to enumerate serial ports: {}", e))
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(not(feature = "instrument_serial"))]
pub fn list_ports() -> AppResult<Vec<String>> {
    Err(crate::error::DaqError::FeatureNotEnabled(
        "instrument_serial".to_string(),
    ))
}
