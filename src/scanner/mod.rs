// src/scanner/mod.rs
pub mod calibration;
pub mod classifier;
pub mod error;
pub mod frame;
pub mod link;
pub mod pipeline;
pub mod serial;
pub mod snv;
pub mod store;
pub mod synthetic;
pub mod table;
pub use calibration::{CalibratedSpectrum, CalibrationEngine, CalibrationReference, CalibrationState};
pub use classifier::{ClassPrototype, ClassScore, Classification, Classifier, EXPERIMENTAL_TAG};
pub use error::ScanError;
pub use frame::{from_unix_nanos, unix_nanos, ChannelMap, RawFrame};
pub use link::{DeviceLink, ManualLink};
pub use pipeline::{Measurement, ScanPipeline};
pub use serial::{SerialDeviceLink, SerialSettings, WireFormat};
pub use snv::{snv, snv_transform, SnvSpectrum};
pub use store::{
    MeasurementRecord, MeasurementStore, RecordKind, RecordSpectra, SampleMetadata,
    SessionSnapshot,
};
pub use synthetic::SyntheticDeviceLink;
pub use table::{export_session, import_session, ImportMode, ImportSummary, SessionTable, TableRow};
