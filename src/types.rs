// src/types.rs
use std::fmt;
use std::path::PathBuf;
use crate::scanner::{Classification, ImportMode, MeasurementRecord, SampleMetadata};

// 连接模式
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Simulation => write!(f, "simulation"),
            ConnectionMode::Hardware => write!(f, "hardware"),
        }
    }
}

// 前端发给后台的命令
#[derive(Clone, Debug)]
pub enum ScanCommand {
    Connect(ConnectionMode),
    Calibrate(SampleMetadata),
    ClearCalibration,
    Measure(SampleMetadata),
    EditMetadata { sequence: u64, metadata: SampleMetadata },
    /// `None` classifies the latest measurement that has an SNV spectrum.
    Classify(Option<u64>),
    ShowLast(usize),
    Materials,
    Export(PathBuf),
    Import(PathBuf, ImportMode),
    Shutdown,
}

// 后台发给前端的消息
#[derive(Clone, Debug)]
pub enum ScanMessage {
    Log(String),
    Status { mode: ConnectionMode, device: String },
    Calibrated(MeasurementRecord),
    Measured { record: MeasurementRecord, issue: Option<String> },
    MetadataUpdated(MeasurementRecord),
    Classified { sequence: u64, result: Classification },
    History(Vec<MeasurementRecord>),
    Materials(Vec<String>),
    Exported { path: PathBuf, rows: usize },
    Imported {
        path: PathBuf,
        records: usize,
        references: usize,
        /// Rows left without processed spectra, one line each.
        issues: Vec<String>,
    },
    Error(String),
    Stopped,
}
