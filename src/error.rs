use thiserror::Error;

/// Errors that can occur while scanning for beacons
#[derive(Error, Debug)]
pub enum BeaconError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No Bluetooth adapter at the requested index
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Operation requires a bound scanning backend
    #[error("Scanning backend is not bound")]
    NotBound,

    /// Backend bind timeout
    #[error("Bind timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Ranging session could not be started
    #[error("Failed to start ranging: {0}")]
    RangingFailed(String),

    /// Beacon layout string is malformed
    #[error("Invalid beacon layout: {0}")]
    InvalidLayout(String),

    /// Identifier or frame parsing failed
    #[error("Failed to parse: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for beacon scanning operations
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Check if this error comes from the Bluetooth stack or adapter
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::AdapterNotFound | Self::NotBound | Self::Timeout { .. }
        )
    }

    /// Check if retrying the same operation later may succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RangingFailed(_) | Self::NotBound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let adapter_error = BeaconError::AdapterNotFound;
        assert!(adapter_error.is_connection_error());
        assert!(!adapter_error.is_recoverable());

        let timeout_error = BeaconError::Timeout { timeout_ms: 5000 };
        assert!(timeout_error.is_connection_error());
        assert!(timeout_error.is_recoverable());

        let layout_error = BeaconError::InvalidLayout("x:0-1".to_string());
        assert!(!layout_error.is_connection_error());
        assert!(!layout_error.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = BeaconError::InvalidLayout("unknown term q:1-2".to_string());
        let error_string = format!("{error}");
        assert!(error_string.contains("Invalid beacon layout"));
        assert!(error_string.contains("q:1-2"));

        let timeout = BeaconError::Timeout { timeout_ms: 250 };
        assert_eq!(timeout.to_string(), "Bind timed out after 250ms");
    }
}
