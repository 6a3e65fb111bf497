use std::time::Duration;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no frame received within {waited:?}")]
    LinkTimeout { waited: Duration },
    #[error("device link disconnected: {reason}")]
    LinkDisconnected { reason: String },
    #[error("malformed frame: {reason}")]
    FrameParse { reason: String },
    #[error("no calibration reference set; calibrate first")]
    NoReferenceSet,
    #[error("calibration reference is zero on channel {channel}")]
    CalibrationDivideByZero { channel: usize },
    #[error("spectrum has zero variance; SNV is undefined")]
    ZeroVariance,
    #[error("no measurement with sequence number {sequence}")]
    RecordNotFound { sequence: u64 },
    #[error("measurement #{sequence} has no SNV spectrum to classify")]
    NoSpectrum { sequence: u64 },
    #[error("prototype '{label}' has {actual} channels, expected {expected}")]
    PrototypeShapeMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
    #[error("failed to open serial port '{port}': {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("import failed at row {row}: {reason}")]
    Import { row: usize, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
impl ScanError {
    /// Errors the caller may retry without touching stored state.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScanError::LinkTimeout { .. } | ScanError::FrameParse { .. }
        )
    }
    /// Errors that leave a measurement without calibrated or SNV data.
    pub fn invalidates_spectrum(&self) -> bool {
        matches!(
            self,
            ScanError::NoReferenceSet
                | ScanError::CalibrationDivideByZero { .. }
                | ScanError::ZeroVariance
        )
    }
    pub(crate) fn import(row: usize, reason: impl Into<String>) -> Self {
        ScanError::Import {
            row,
            reason: reason.into(),
        }
    }
}
