use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use log::{debug, info};
use parking_lot::RwLock;
use crate::scanner::snv::snv;
use crate::scanner::{CalibratedSpectrum, CalibrationReference, RawFrame, ScanError, SnvSpectrum};
/// Whether a record is a sample measurement or the capture of a reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Regular,
    Calibration,
}
impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Regular => "regular",
            RecordKind::Calibration => "calibration",
        }
    }
}
impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for RecordKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "regular" => Ok(RecordKind::Regular),
            "calibration" => Ok(RecordKind::Calibration),
            other => Err(format!("unknown record kind {other:?}")),
        }
    }
}
/// User-editable description of the scanned sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleMetadata {
    pub material: String,
    /// True when the material label is ground truth rather than a guess.
    pub known: bool,
    pub name: String,
    pub color: String,
    pub note: String,
}
impl Default for SampleMetadata {
    fn default() -> Self {
        Self {
            material: "unknown".into(),
            known: false,
            name: String::new(),
            color: String::new(),
            note: String::new(),
        }
    }
}
impl SampleMetadata {
    /// Metadata for a sample of the given material; `unknown` or an empty label is not known.
    pub fn labelled(material: impl Into<String>) -> Self {
        let material = material.into().trim().to_string();
        let known = !material.is_empty() && !material.eq_ignore_ascii_case("unknown");
        Self {
            material: if material.is_empty() {
                "unknown".into()
            } else {
                material
            },
            known,
            ..Self::default()
        }
    }
}
/// The spectral half of a record; never changes once stored.
#[derive(Debug)]
pub struct RecordSpectra {
    pub kind: RecordKind,
    pub raw: RawFrame,
    pub reference: Option<Arc<CalibrationReference>>,
    pub calibrated: Option<CalibratedSpectrum>,
    pub snv: Option<SnvSpectrum>,
}
impl RecordSpectra {
    pub(crate) fn validate(&self, channels: usize) -> Result<(), ScanError> {
        let widths = [
            Some(self.raw.num_channels()),
            self.reference.as_ref().map(|r| r.frame().num_channels()),
            self.calibrated.as_ref().map(CalibratedSpectrum::len),
            self.snv.as_ref().map(SnvSpectrum::len),
        ];
        if let Some(actual) = widths.into_iter().flatten().find(|w| *w != channels) {
            return Err(ScanError::ChannelMismatch {
                expected: channels,
                actual,
            });
        }
        if self.calibrated.is_some() && self.reference.is_none() {
            return Err(ScanError::InvalidFrame {
                reason: "calibrated values without the reference they came from".into(),
            });
        }
        if self.snv.is_some() && self.calibrated.is_none() {
            return Err(ScanError::InvalidFrame {
                reason: "SNV values without calibrated values".into(),
            });
        }
        Ok(())
    }
    /// Derives calibrated and SNV values again from the raw frame and reference.
    pub fn recompute(&self) -> Result<(CalibratedSpectrum, SnvSpectrum), ScanError> {
        let reference = self.reference.as_ref().ok_or(ScanError::NoReferenceSet)?;
        let calibrated = reference.calibrate(&self.raw)?;
        let snv = snv(&calibrated)?;
        Ok((calibrated, snv))
    }
}
#[derive(Clone, Debug)]
pub struct MeasurementRecord {
    sequence: u64,
    spectra: Arc<RecordSpectra>,
    metadata: SampleMetadata,
}
impl MeasurementRecord {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
    pub fn timestamp(&self) -> SystemTime {
        self.spectra.raw.timestamp()
    }
    pub fn kind(&self) -> RecordKind {
        self.spectra.kind
    }
    pub fn raw(&self) -> &RawFrame {
        &self.spectra.raw
    }
    pub fn reference(&self) -> Option<&Arc<CalibrationReference>> {
        self.spectra.reference.as_ref()
    }
    pub fn calibrated(&self) -> Option<&CalibratedSpectrum> {
        self.spectra.calibrated.as_ref()
    }
    pub fn snv(&self) -> Option<&SnvSpectrum> {
        self.spectra.snv.as_ref()
    }
    pub fn spectra(&self) -> &RecordSpectra {
        &self.spectra
    }
    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }
    pub fn recompute(&self) -> Result<(CalibratedSpectrum, SnvSpectrum), ScanError> {
        self.spectra.recompute()
    }
}
/// Point-in-time copy of the session, iterable as often as needed.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    records: Arc<[MeasurementRecord]>,
}
impl SessionSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, MeasurementRecord> {
        self.records.iter()
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
impl<'a> IntoIterator for &'a SessionSnapshot {
    type Item = &'a MeasurementRecord;
    type IntoIter = std::slice::Iter<'a, MeasurementRecord>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
struct StoreInner {
    records: Vec<MeasurementRecord>,
    next_sequence: u64,
}
/// Append-only session log.
///
/// Appends and metadata edits take the write lock; readers get snapshots.
pub struct MeasurementStore {
    channels: usize,
    inner: RwLock<StoreInner>,
}
impl MeasurementStore {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            inner: RwLock::new(StoreInner {
                records: Vec::new(),
                next_sequence: 1,
            }),
        }
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn append(
        &self,
        spectra: RecordSpectra,
        metadata: SampleMetadata,
    ) -> Result<MeasurementRecord, ScanError> {
        spectra.validate(self.channels)?;
        let mut inner = self.inner.write();
        let record = MeasurementRecord {
            sequence: inner.next_sequence,
            spectra: Arc::new(spectra),
            metadata,
        };
        inner.next_sequence += 1;
        inner.records.push(record.clone());
        debug!(
            "appended {} record #{} ({})",
            record.kind(),
            record.sequence,
            record.metadata.material
        );
        Ok(record)
    }
    /// Replaces the metadata of one record; spectral fields are untouched.
    pub fn edit_metadata(
        &self,
        sequence: u64,
        metadata: SampleMetadata,
    ) -> Result<MeasurementRecord, ScanError> {
        let mut inner = self.inner.write();
        let index = inner
            .records
            .binary_search_by_key(&sequence, |r| r.sequence)
            .map_err(|_| ScanError::RecordNotFound { sequence })?;
        let record = &mut inner.records[index];
        record.metadata = metadata;
        Ok(record.clone())
    }
    pub fn get(&self, sequence: u64) -> Option<MeasurementRecord> {
        let inner = self.inner.read();
        inner
            .records
            .binary_search_by_key(&sequence, |r| r.sequence)
            .ok()
            .map(|i| inner.records[i].clone())
    }
    pub fn all(&self) -> SessionSnapshot {
        SessionSnapshot {
            records: self.inner.read().records.as_slice().into(),
        }
    }
    /// The `n` most recent records, oldest first.
    pub fn last(&self, n: usize) -> Vec<MeasurementRecord> {
        let inner = self.inner.read();
        let start = inner.records.len().saturating_sub(n);
        inner.records[start..].to_vec()
    }
    /// Most recent regular record with a valid SNV spectrum.
    pub fn latest_classifiable(&self) -> Option<MeasurementRecord> {
        self.inner
            .read()
            .records
            .iter()
            .rev()
            .find(|r| r.kind() == RecordKind::Regular && r.snv().is_some())
            .cloned()
    }
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
    /// Material labels: the defaults first, then any new ones in order of appearance.
    pub fn materials(&self, defaults: &[String]) -> Vec<String> {
        let mut labels: Vec<String> = Vec::with_capacity(defaults.len());
        for label in defaults {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        for record in self.inner.read().records.iter() {
            if !labels.contains(&record.metadata.material) {
                labels.push(record.metadata.material.clone());
            }
        }
        labels
    }
    /// Swaps in a whole session; sequence numbers must be strictly increasing.
    pub(crate) fn replace_all(
        &self,
        entries: Vec<(u64, RecordSpectra, SampleMetadata)>,
    ) -> Result<usize, ScanError> {
        let mut records = Vec::with_capacity(entries.len());
        let mut last = 0u64;
        for (index, (sequence, spectra, metadata)) in entries.into_iter().enumerate() {
            spectra.validate(self.channels)?;
            if sequence <= last {
                return Err(ScanError::import(
                    index + 1,
                    format!("sequence {sequence} does not follow {last}"),
                ));
            }
            last = sequence;
            records.push(MeasurementRecord {
                sequence,
                spectra: Arc::new(spectra),
                metadata,
            });
        }
        let count = records.len();
        let mut inner = self.inner.write();
        inner.records = records;
        inner.next_sequence = last + 1;
        info!("session replaced with {count} records");
        Ok(count)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::CalibrationEngine;
    fn frame(values: &[f64]) -> RawFrame {
        RawFrame::new(values.to_vec()).unwrap()
    }
    fn raw_only(values: &[f64]) -> RecordSpectra {
        RecordSpectra {
            kind: RecordKind::Regular,
            raw: frame(values),
            reference: None,
            calibrated: None,
            snv: None,
        }
    }
    fn measured(engine: &CalibrationEngine, values: &[f64]) -> RecordSpectra {
        let raw = frame(values);
        let (calibrated, reference) = engine.calibrate_with_reference(&raw).unwrap();
        let snv = snv(&calibrated).unwrap();
        RecordSpectra {
            kind: RecordKind::Regular,
            raw,
            reference: Some(reference),
            calibrated: Some(calibrated),
            snv: Some(snv),
        }
    }
    #[test]
    fn sequences_increase_and_last_keeps_order() {
        let store = MeasurementStore::new(2);
        let a = store.append(raw_only(&[1.0, 2.0]), SampleMetadata::default()).unwrap();
        let b = store.append(raw_only(&[3.0, 4.0]), SampleMetadata::default()).unwrap();
        let c = store.append(raw_only(&[5.0, 6.0]), SampleMetadata::default()).unwrap();
        assert!(a.sequence() < b.sequence() && b.sequence() < c.sequence());
        let last: Vec<u64> = store.last(3).iter().map(|r| r.sequence()).collect();
        assert_eq!(last, vec![a.sequence(), b.sequence(), c.sequence()]);
        let last_two: Vec<u64> = store.last(2).iter().map(|r| r.sequence()).collect();
        assert_eq!(last_two, vec![b.sequence(), c.sequence()]);
        assert_eq!(store.last(10).len(), 3);
    }
    #[test]
    fn metadata_edit_touches_only_that_record() {
        let engine = CalibrationEngine::new(3);
        engine.set_reference(frame(&[10.0, 10.0, 10.0])).unwrap();
        let store = MeasurementStore::new(3);
        let first = store
            .append(measured(&engine, &[1.0, 2.0, 4.0]), SampleMetadata::default())
            .unwrap();
        let second = store
            .append(measured(&engine, &[2.0, 2.0, 5.0]), SampleMetadata::labelled("PP"))
            .unwrap();
        let mut edited = SampleMetadata::labelled("PET");
        edited.note = "bottle cap".into();
        store.edit_metadata(first.sequence(), edited.clone()).unwrap();
        let after = store.get(first.sequence()).unwrap();
        assert_eq!(after.metadata(), &edited);
        assert_eq!(after.raw(), first.raw());
        assert_eq!(after.calibrated(), first.calibrated());
        assert_eq!(after.snv(), first.snv());
        let other = store.get(second.sequence()).unwrap();
        assert_eq!(other.metadata(), &SampleMetadata::labelled("PP"));
        assert_eq!(other.snv(), second.snv());
    }
    #[test]
    fn editing_unknown_sequence_fails() {
        let store = MeasurementStore::new(1);
        assert!(matches!(
            store.edit_metadata(9, SampleMetadata::default()),
            Err(ScanError::RecordNotFound { sequence: 9 })
        ));
    }
    #[test]
    fn recompute_reproduces_stored_values_exactly() {
        let engine = CalibrationEngine::new(3);
        engine.set_reference(frame(&[0.23, 0.22, 0.24])).unwrap();
        let store = MeasurementStore::new(3);
        let record = store
            .append(measured(&engine, &[0.11, 0.17, 0.05]), SampleMetadata::default())
            .unwrap();
        // a newer reference must not affect the stored record
        engine.set_reference(frame(&[1.0, 1.0, 1.0])).unwrap();
        let (calibrated, snv) = record.recompute().unwrap();
        assert_eq!(Some(&calibrated), record.calibrated());
        assert_eq!(Some(&snv), record.snv());
    }
    #[test]
    fn snapshot_is_restartable_and_isolated_from_later_appends() {
        let store = MeasurementStore::new(1);
        store.append(raw_only(&[1.0]), SampleMetadata::default()).unwrap();
        let snapshot = store.all();
        store.append(raw_only(&[2.0]), SampleMetadata::default()).unwrap();
        assert_eq!(snapshot.iter().count(), 1);
        assert_eq!((&snapshot).into_iter().count(), 1);
        assert_eq!(store.all().len(), 2);
    }
    #[test]
    fn concurrent_appends_keep_sequences_gapless() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 50;
        let store = MeasurementStore::new(1);
        std::thread::scope(|s| {
            for writer in 0..WRITERS {
                let store = &store;
                s.spawn(move || {
                    for i in 0..PER_WRITER {
                        let record = store
                            .append(raw_only(&[i as f64]), SampleMetadata::labelled("PET"))
                            .unwrap();
                        let metadata = SampleMetadata::labelled(format!("writer{writer}"));
                        store.edit_metadata(record.sequence(), metadata).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..100 {
                    let snapshot = store.all();
                    for (expected, record) in (1..).zip(snapshot.iter()) {
                        assert_eq!(record.sequence(), expected);
                    }
                }
            });
        });
        let all = store.all();
        assert_eq!(all.len(), WRITERS * PER_WRITER);
        assert!((1..).zip(all.iter()).all(|(seq, r)| r.sequence() == seq));
        assert!(all.iter().all(|r| r.metadata().material.starts_with("writer")));
    }
    #[test]
    fn rejects_inconsistent_spectra() {
        let store = MeasurementStore::new(2);
        assert!(matches!(
            store.append(raw_only(&[1.0]), SampleMetadata::default()),
            Err(ScanError::ChannelMismatch { .. })
        ));
        let mut orphan = raw_only(&[1.0, 2.0]);
        orphan.calibrated = Some(CalibratedSpectrum::from_values(vec![0.1, 0.2]).unwrap());
        assert!(store.append(orphan, SampleMetadata::default()).is_err());
        assert!(store.is_empty());
    }
    #[test]
    fn materials_extend_defaults_in_order() {
        let store = MeasurementStore::new(1);
        store.append(raw_only(&[1.0]), SampleMetadata::labelled("PLA")).unwrap();
        store.append(raw_only(&[1.0]), SampleMetadata::labelled("PET")).unwrap();
        let defaults = vec!["PET".to_string(), "unknown".to_string()];
        assert_eq!(store.materials(&defaults), vec!["PET", "unknown", "PLA"]);
    }
    #[test]
    fn labelled_metadata_flags_known_materials() {
        assert!(SampleMetadata::labelled("HDPE").known);
        assert!(!SampleMetadata::labelled("unknown").known);
        assert_eq!(SampleMetadata::labelled("  ").material, "unknown");
    }
}
