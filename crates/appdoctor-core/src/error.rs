//! Error taxonomy for appdoctor.
//!
//! Conditions found in the inspected application are never errors here; they
//! become [`Finding`](crate::Finding)s. These variants cover programmer errors
//! (bad export format, bad settings file) and collaborator failures that a
//! check converts into findings before they can escape a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown severity level: {0}")]
    UnknownLevel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("probe '{probe}' timed out after {secs}s")]
    ProbeTimeout { probe: String, secs: u64 },

    #[error("probe error: {0}")]
    Probe(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("settings parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for appdoctor library operations.
pub type Result<T> = std::result::Result<T, DoctorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_display() {
        let err = DoctorError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "unsupported export format: yaml");
    }

    #[test]
    fn test_probe_timeout_display() {
        let err = DoctorError::ProbeTimeout {
            probe: "database ping".to_string(),
            secs: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("database ping"));
        assert!(msg.contains("10s"));
    }
}
