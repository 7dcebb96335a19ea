//! Error types and handling for Helios
//!
//! This module defines the error types used throughout the controller.
//! Backend failures (command, MQTT, Modbus, timeouts, parsing) abort a single
//! control tick; validation errors reject a request before any state changes;
//! stale cache reads are kept distinct so callers can degrade instead of fail.

use thiserror::Error;

/// Result type alias for Helios operations
pub type Result<T> = std::result::Result<T, HeliosError>;

/// Main error type for Helios
#[derive(Debug, Error)]
pub enum HeliosError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A provider or setter call exceeded its deadline
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// External command failed to start or exited non-zero
    #[error("Command error: {message}")]
    Command { message: String },

    /// Backend returned a value that could not be parsed or formatted
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Cached subscription value is older than its staleness window
    #[error("Stale value: {message}")]
    Stale { message: String },

    /// MQTT client errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// Modbus communication errors
    #[error("Modbus error: {message}")]
    Modbus { message: String },

    /// Device reported a failure (charger, meter, charge controller)
    #[error("Device error: {message}")]
    Device { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl HeliosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeliosError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        HeliosError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        HeliosError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        HeliosError::Command {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        HeliosError::Parse {
            message: message.into(),
        }
    }

    /// Create a new stale value error
    pub fn stale<S: Into<String>>(message: S) -> Self {
        HeliosError::Stale {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        HeliosError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new Modbus error
    pub fn modbus<S: Into<String>>(message: S) -> Self {
        HeliosError::Modbus {
            message: message.into(),
        }
    }

    /// Create a new device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        HeliosError::Device {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeliosError::Io {
            message: message.into(),
        }
    }

    /// Whether this error reports an outdated cached value rather than a hard failure
    pub fn is_stale(&self) -> bool {
        matches!(self, HeliosError::Stale { .. })
    }

    /// Whether this error was caused by a call deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, HeliosError::Timeout { .. })
    }
}

impl From<std::io::Error> for HeliosError {
    fn from(err: std::io::Error) -> Self {
        HeliosError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliosError {
    fn from(err: serde_yaml::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliosError {
    fn from(err: serde_json::Error) -> Self {
        HeliosError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for HeliosError {
    fn from(err: std::num::ParseIntError) -> Self {
        HeliosError::parse(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for HeliosError {
    fn from(err: std::num::ParseFloatError) -> Self {
        HeliosError::parse(err.to_string())
    }
}

impl From<rumqttc::ClientError> for HeliosError {
    fn from(err: rumqttc::ClientError) -> Self {
        HeliosError::mqtt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = HeliosError::config("test config error");
        assert!(matches!(err, HeliosError::Config { .. }));

        let err = HeliosError::command("exit status 1");
        assert!(matches!(err, HeliosError::Command { .. }));

        let err = HeliosError::validation("mode", "test validation error");
        assert!(matches!(err, HeliosError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = HeliosError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = HeliosError::validation("mode", "grid meter required");
        assert_eq!(
            format!("{}", err),
            "Validation error: mode - grid meter required"
        );
    }

    #[test]
    fn test_stale_and_timeout_are_distinguishable() {
        assert!(HeliosError::stale("grid/power").is_stale());
        assert!(!HeliosError::timeout("status").is_stale());
        assert!(HeliosError::timeout("status").is_timeout());
    }

    #[test]
    fn test_parse_errors_convert() {
        let err: HeliosError = "4x2".parse::<i64>().unwrap_err().into();
        assert!(matches!(err, HeliosError::Parse { .. }));
        let err: HeliosError = "abc".parse::<f64>().unwrap_err().into();
        assert!(matches!(err, HeliosError::Parse { .. }));
    }
}
