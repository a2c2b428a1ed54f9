use std::io;
use thiserror::Error;

use cups_raw::WireError;

#[derive(Error, Debug)]
pub enum CupsError {
    #[error("PECI transfer to 0x{target:02x} failed: {reason}")]
    TransportError { target: u8, reason: String },

    #[error("PECI request {request} to 0x{target:02x} failed: {source}")]
    CommandError {
        target: u8,
        request: &'static str,
        #[source]
        source: WireError,
    },

    #[error("Wire format error: {0}")]
    WireError(#[from] WireError),

    #[error("Unsupported CPU at 0x{address:02x}: {reason}")]
    UnsupportedCpu { address: u8, reason: String },

    #[error("Discovery failed at 0x{address:02x}: {reason}")]
    DiscoveryError { address: u8, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CupsError {
    pub fn discovery(address: u8, reason: impl Into<String>) -> Self {
        CupsError::DiscoveryError {
            address,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CupsError>;
