//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes of the acquisition
//! pipeline, from configuration and I/O problems to per-sample conversion
//! failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from the `config` crate (file parsing or
//!   format issues in the configuration files).
//! - **`InvalidParameter`**: Semantic errors in session parameters that pass
//!   parsing but are logically wrong (empty port name, zero baud rate).
//! - **`Connection`**: The serial port could not be opened at session start.
//!   Fatal to that start attempt only; never retried automatically.
//! - **`MalformedFrame`**: An inbound line that does not form a valid frame.
//!   The reader drops such lines silently; this variant exists so the parser
//!   can be exercised as a plain function.
//! - **`EmfOutOfRange`**: A thermocouple EMF outside every linearization
//!   segment. Aborts the conversion of that single sample, never the session.
//!   Note the deliberate asymmetry: the resistance path reports undefined
//!   inputs as NaN values rather than errors.
//! - **`Storage`** / **`Io`**: Durable-log failures. The persistence buffer
//!   is retained and the flush retried on the next trigger.
//! - **`AlreadyRunning`** / **`NotConnected`**: Session state machine misuse.
//! - **`FeatureNotEnabled`**: Functionality compiled out via feature flags,
//!   with a message telling the user how to enable it.
//!
//! By using `#[from]`, `DaqError` can be seamlessly created from underlying
//! error types, simplifying error handling with the `?` operator.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Application-wide error type for the acquisition pipeline.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("EMF {emf} mV out of range for Type S thermocouple")]
    EmfOutOfRange { emf: f64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A logging session is already running")]
    AlreadyRunning,

    #[error("Not connected")]
    NotConnected,

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl DaqError {
    /// True for failures that end a start attempt rather than a session.
    pub fn is_fatal_to_start(&self) -> bool {
        matches!(
            self,
            DaqError::Connection(_)
                | DaqError::InvalidParameter(_)
                | DaqError::AlreadyRunning
                | DaqError::FeatureNotEnabled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display_includes_value() {
        let err = DaqError::EmfOutOfRange { emf: 25.0 };
        assert_eq!(
            err.to_string(),
            "EMF 25 mV out of range for Type S thermocouple"
        );
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DaqError = io.into();
        assert!(matches!(err, DaqError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn start_fatal_classification() {
        assert!(DaqError::Connection("busy".into()).is_fatal_to_start());
        assert!(DaqError::AlreadyRunning.is_fatal_to_start());
        assert!(!DaqError::Storage("disk full".into()).is_fatal_to_start());
        assert!(!DaqError::EmfOutOfRange { emf: 25.0 }.is_fatal_to_start());
    }
}
