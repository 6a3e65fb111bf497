use std::sync::Arc;
use log::{info, warn};
use crate::scanner::snv::snv;
use crate::scanner::store::{RecordKind, RecordSpectra, SampleMetadata};
use crate::scanner::table::{export_session, import_session, ImportMode, ImportSummary, SessionTable};
use crate::scanner::{
    ChannelMap, Classification, Classifier, DeviceLink, MeasurementRecord, MeasurementStore,
    CalibrationEngine, RawFrame, ScanError,
};
/// A stored measurement plus the reason its spectra are missing, if any.
#[derive(Debug)]
pub struct Measurement {
    pub record: MeasurementRecord,
    /// `NoReferenceSet`, `CalibrationDivideByZero` or `ZeroVariance`.
    pub issue: Option<ScanError>,
}
/// Acquire → calibrate → SNV → store, with classification on demand.
pub struct ScanPipeline<L: DeviceLink> {
    link: L,
    channels: ChannelMap,
    calibration: CalibrationEngine,
    store: Arc<MeasurementStore>,
    classifier: Classifier,
}
impl<L: DeviceLink> ScanPipeline<L> {
    pub fn new(link: L, channels: ChannelMap, classifier: Classifier) -> Result<Self, ScanError> {
        channels.check(link.channel_count())?;
        if classifier.channels() != channels.len() {
            return Err(ScanError::PrototypeShapeMismatch {
                label: classifier.prototypes()[0].label().to_string(),
                expected: channels.len(),
                actual: classifier.channels(),
            });
        }
        info!(
            "pipeline ready on {} with {} channels",
            link.describe(),
            channels.len()
        );
        Ok(Self {
            calibration: CalibrationEngine::new(channels.len()),
            store: Arc::new(MeasurementStore::new(channels.len())),
            link,
            channels,
            classifier,
        })
    }
    pub fn link(&self) -> &L {
        &self.link
    }
    /// Swaps the device link, e.g. falling back to synthetic mode; returns the old one.
    pub fn replace_link(&mut self, link: L) -> Result<L, ScanError> {
        self.channels.check(link.channel_count())?;
        info!("device link {} -> {}", self.link.describe(), link.describe());
        Ok(std::mem::replace(&mut self.link, link))
    }
    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }
    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }
    pub fn store(&self) -> &Arc<MeasurementStore> {
        &self.store
    }
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }
    /// One frame from the link; a malformed frame is retried once.
    pub fn acquire(&mut self) -> Result<RawFrame, ScanError> {
        let frame = match self.link.acquire() {
            Err(ScanError::FrameParse { reason }) => {
                warn!("discarded malformed frame ({reason}); retrying once");
                self.link.acquire()?
            }
            other => other?,
        };
        self.channels.check(frame.num_channels())?;
        Ok(frame)
    }
    /// Captures a new reference and logs it as a calibration record.
    pub fn calibrate_reference(
        &mut self,
        metadata: SampleMetadata,
    ) -> Result<MeasurementRecord, ScanError> {
        let frame = self.acquire()?;
        let reference = self.calibration.set_reference(frame)?;
        let calibrated = match reference.calibrate(reference.frame()) {
            Ok(ones) => Some(ones),
            Err(err) => {
                warn!("reference #{} is unusable: {err}", reference.id());
                None
            }
        };
        self.store.append(
            RecordSpectra {
                kind: RecordKind::Calibration,
                raw: reference.frame().clone(),
                reference: Some(Arc::clone(&reference)),
                calibrated,
                snv: None,
            },
            metadata,
        )
    }
    pub fn clear_calibration(&self) {
        self.calibration.clear_reference();
    }
    pub fn measure(&mut self, metadata: SampleMetadata) -> Result<Measurement, ScanError> {
        let raw = self.acquire()?;
        self.process(raw, metadata)
    }
    /// Calibrates, normalizes and stores a frame. Calibration problems do not
    /// fail the call: the raw frame is kept and the spectra are left absent.
    pub fn process(
        &self,
        raw: RawFrame,
        metadata: SampleMetadata,
    ) -> Result<Measurement, ScanError> {
        let reference = self.calibration.active_reference();
        let calibrated = match &reference {
            Some(reference) => reference.calibrate(&raw),
            None => Err(ScanError::NoReferenceSet),
        };
        let (calibrated, snv, issue) = match calibrated {
            Ok(calibrated) => match snv(&calibrated) {
                Ok(snv) => (Some(calibrated), Some(snv), None),
                Err(err) => (Some(calibrated), None, Some(err)),
            },
            Err(err) if err.invalidates_spectrum() => (None, None, Some(err)),
            Err(err) => return Err(err),
        };
        if let Some(issue) = &issue {
            warn!("measurement stored without processed spectra: {issue}");
        }
        let record = self.store.append(
            RecordSpectra {
                kind: RecordKind::Regular,
                raw,
                reference,
                calibrated,
                snv,
            },
            metadata,
        )?;
        info!(
            "measurement #{} stored ({})",
            record.sequence(),
            record.metadata().material
        );
        Ok(Measurement { record, issue })
    }
    pub fn classify(&self, sequence: u64) -> Result<Classification, ScanError> {
        let record = self
            .store
            .get(sequence)
            .ok_or(ScanError::RecordNotFound { sequence })?;
        let snv = record.snv().ok_or(ScanError::NoSpectrum { sequence })?;
        self.classifier.classify(snv)
    }
    pub fn classify_latest(
        &self,
    ) -> Result<Option<(MeasurementRecord, Classification)>, ScanError> {
        let Some(record) = self.store.latest_classifiable() else {
            return Ok(None);
        };
        let classification = match record.snv() {
            Some(snv) => self.classifier.classify(snv)?,
            None => return Ok(None),
        };
        Ok(Some((record, classification)))
    }
    pub fn edit_metadata(
        &self,
        sequence: u64,
        metadata: SampleMetadata,
    ) -> Result<MeasurementRecord, ScanError> {
        self.store.edit_metadata(sequence, metadata)
    }
    pub fn export(&self) -> SessionTable {
        export_session(&self.store, &self.channels)
    }
    /// Replaces the session and clears the active reference.
    pub fn import(
        &mut self,
        table: &SessionTable,
        mode: ImportMode,
    ) -> Result<ImportSummary, ScanError> {
        if table.channels != self.channels {
            return Err(ScanError::Import {
                row: 0,
                reason: format!(
                    "table channels {:?} differ from scanner channels {:?}",
                    table.channels.wavelengths_nm(),
                    self.channels.wavelengths_nm()
                ),
            });
        }
        let summary = import_session(table, mode, &self.store)?;
        self.calibration.clear_reference();
        if let Some(id) = summary.max_reference_id {
            self.calibration.reserve_ids_through(id);
        }
        Ok(summary)
    }
}
