//! Flat, row-per-record view of a session for persistence collaborators.
//!
//! Columns: `sequence, timestamp, kind, raw[channels], reference_id,
//! calibrated[channels], snv[channels], material_label, known_flag,
//! sample_name, color, note`. Calibration rows carry the reference frame
//! itself, so an imported session can resolve every `reference_id`.
use std::collections::HashMap;
use std::sync::Arc;
use log::{info, warn};
use crate::scanner::snv::snv;
use crate::scanner::store::{RecordKind, RecordSpectra, SampleMetadata};
use crate::scanner::{
    from_unix_nanos, unix_nanos, CalibratedSpectrum, CalibrationReference, ChannelMap,
    MeasurementStore, RawFrame, ScanError, SnvSpectrum,
};
#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    /// Absent sequence numbers are reassigned on import.
    pub sequence: Option<u64>,
    /// Capture time in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    pub kind: RecordKind,
    pub raw: Vec<f64>,
    pub reference_id: Option<u64>,
    pub calibrated: Option<Vec<f64>>,
    pub snv: Option<Vec<f64>>,
    pub metadata: SampleMetadata,
}
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTable {
    pub channels: ChannelMap,
    pub rows: Vec<TableRow>,
}
impl SessionTable {
    pub fn new(channels: ChannelMap) -> Self {
        Self {
            channels,
            rows: Vec::new(),
        }
    }
    pub fn header(&self) -> Vec<String> {
        Self::header_for(&self.channels)
    }
    pub fn header_for(channels: &ChannelMap) -> Vec<String> {
        let labels = channels.labels();
        let mut header = vec!["sequence".to_string(), "timestamp".into(), "kind".into()];
        header.extend(labels.iter().cloned());
        header.push("reference_id".into());
        header.extend(labels.iter().map(|l| format!("{l}_cal")));
        header.extend(labels.iter().map(|l| format!("{l}_snv")));
        header.extend(
            ["material_label", "known_flag", "sample_name", "color", "note"]
                .into_iter()
                .map(String::from),
        );
        header
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportMode {
    /// Keep the calibrated and SNV values exactly as exported.
    Verbatim,
    /// Recompute calibrated and SNV values from raw frames and references.
    Replay,
}
#[derive(Debug)]
pub struct ImportSummary {
    pub records: usize,
    pub references: usize,
    pub max_reference_id: Option<u64>,
    /// Rows stored without processed spectra in `Replay` mode, by sequence number.
    pub issues: Vec<(u64, ScanError)>,
}
pub fn export_session(store: &MeasurementStore, channels: &ChannelMap) -> SessionTable {
    let rows = store
        .all()
        .iter()
        .map(|record| TableRow {
            sequence: Some(record.sequence()),
            timestamp_ns: unix_nanos(record.timestamp()),
            kind: record.kind(),
            raw: record.raw().values().to_vec(),
            reference_id: record.reference().map(|r| r.id()),
            calibrated: record.calibrated().map(|c| c.values().to_vec()),
            snv: record.snv().map(|s| s.values().to_vec()),
            metadata: record.metadata().clone(),
        })
        .collect::<Vec<_>>();
    info!("exported {} records", rows.len());
    SessionTable {
        channels: channels.clone(),
        rows,
    }
}
/// Rebuilds the store from `table`, replacing whatever it held.
///
/// Nothing is replaced unless every row is valid.
pub fn import_session(
    table: &SessionTable,
    mode: ImportMode,
    store: &MeasurementStore,
) -> Result<ImportSummary, ScanError> {
    if table.channels.len() != store.channels() {
        return Err(ScanError::ChannelMismatch {
            expected: store.channels(),
            actual: table.channels.len(),
        });
    }
    let mut references: HashMap<u64, Arc<CalibrationReference>> = HashMap::new();
    let mut entries = Vec::with_capacity(table.rows.len());
    let mut issues = Vec::new();
    let mut last_sequence = 0u64;
    for (index, row) in table.rows.iter().enumerate() {
        let row_no = index + 1;
        let sequence = match row.sequence {
            Some(seq) if seq <= last_sequence => {
                return Err(ScanError::import(
                    row_no,
                    format!("sequence {seq} does not follow {last_sequence}"),
                ))
            }
            Some(seq) => seq,
            None => last_sequence + 1,
        };
        last_sequence = sequence;
        let raw = RawFrame::captured_at(from_unix_nanos(row.timestamp_ns), row.raw.clone())
            .map_err(|e| ScanError::import(row_no, e.to_string()))?;
        let reference = match (row.kind, row.reference_id) {
            (RecordKind::Calibration, Some(id)) => {
                if references.contains_key(&id) {
                    return Err(ScanError::import(
                        row_no,
                        format!("reference {id} is defined twice"),
                    ));
                }
                let reference = Arc::new(CalibrationReference::restore(id, raw.clone()));
                references.insert(id, Arc::clone(&reference));
                Some(reference)
            }
            (RecordKind::Calibration, None) => {
                return Err(ScanError::import(row_no, "calibration row without reference_id"))
            }
            (RecordKind::Regular, Some(id)) => Some(references.get(&id).cloned().ok_or_else(
                || ScanError::import(row_no, format!("unknown reference_id {id}")),
            )?),
            (RecordKind::Regular, None) => None,
        };
        let (calibrated, snv_values) = match mode {
            ImportMode::Verbatim => verbatim_spectra(row, row_no)?,
            ImportMode::Replay => {
                let (calibrated, snv_values, issue) =
                    replay_spectra(row.kind, &raw, reference.as_deref());
                if let Some(issue) = issue {
                    warn!("replayed row {row_no} (#{sequence}) has no processed spectra: {issue}");
                    issues.push((sequence, issue));
                }
                (calibrated, snv_values)
            }
        };
        let spectra = RecordSpectra {
            kind: row.kind,
            raw,
            reference,
            calibrated,
            snv: snv_values,
        };
        spectra
            .validate(store.channels())
            .map_err(|e| ScanError::import(row_no, e.to_string()))?;
        entries.push((sequence, spectra, row.metadata.clone()));
    }
    let max_reference_id = references.keys().copied().max();
    let summary = ImportSummary {
        records: entries.len(),
        references: references.len(),
        max_reference_id,
        issues,
    };
    store.replace_all(entries).map_err(|e| match e {
        ScanError::Import { .. } => e,
        other => ScanError::import(0, other.to_string()),
    })?;
    info!(
        "imported {} records with {} references ({mode:?})",
        summary.records, summary.references
    );
    Ok(summary)
}
fn verbatim_spectra(
    row: &TableRow,
    row_no: usize,
) -> Result<(Option<CalibratedSpectrum>, Option<SnvSpectrum>), ScanError> {
    let calibrated = row
        .calibrated
        .clone()
        .map(CalibratedSpectrum::from_values)
        .transpose()
        .map_err(|e| ScanError::import(row_no, e.to_string()))?;
    let snv = row
        .snv
        .clone()
        .map(SnvSpectrum::from_values)
        .transpose()
        .map_err(|e| ScanError::import(row_no, e.to_string()))?;
    Ok((calibrated, snv))
}
/// Calibration rows get calibrated values only; the SNV of a flat vector is undefined.
fn replay_spectra(
    kind: RecordKind,
    raw: &RawFrame,
    reference: Option<&CalibrationReference>,
) -> (Option<CalibratedSpectrum>, Option<SnvSpectrum>, Option<ScanError>) {
    let Some(reference) = reference else {
        return (None, None, Some(ScanError::NoReferenceSet));
    };
    let calibrated = match reference.calibrate(raw) {
        Ok(calibrated) => calibrated,
        Err(err) => return (None, None, Some(err)),
    };
    if kind == RecordKind::Calibration {
        return (Some(calibrated), None, None);
    }
    match snv(&calibrated) {
        Ok(snv) => (Some(calibrated), Some(snv), None),
        Err(err) => (Some(calibrated), None, Some(err)),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::CalibrationEngine;
    fn channels() -> ChannelMap {
        ChannelMap::new(vec![940, 1050, 1200]).unwrap()
    }
    fn session() -> MeasurementStore {
        let engine = CalibrationEngine::new(3);
        let store = MeasurementStore::new(3);
        let reference = engine
            .set_reference(RawFrame::new(vec![0.23, 0.22, 0.24]).unwrap())
            .unwrap();
        let ones = reference.calibrate(reference.frame()).unwrap();
        store
            .append(
                RecordSpectra {
                    kind: RecordKind::Calibration,
                    raw: reference.frame().clone(),
                    reference: Some(Arc::clone(&reference)),
                    calibrated: Some(ones),
                    snv: None,
                },
                SampleMetadata::labelled("reference"),
            )
            .unwrap();
        for (values, material) in [
            (vec![0.12, 0.09, 0.15], "PET"),
            (vec![0.20, 0.05, 0.11], "unknown"),
        ] {
            let raw = RawFrame::new(values).unwrap();
            let (calibrated, reference) = engine.calibrate_with_reference(&raw).unwrap();
            let snv = snv(&calibrated).unwrap();
            let mut metadata = SampleMetadata::labelled(material);
            metadata.note = "shelf, left \"B\"".into();
            store
                .append(
                    RecordSpectra {
                        kind: RecordKind::Regular,
                        raw,
                        reference: Some(reference),
                        calibrated: Some(calibrated),
                        snv: Some(snv),
                    },
                    metadata,
                )
                .unwrap();
        }
        store
            .append(
                RecordSpectra {
                    kind: RecordKind::Regular,
                    raw: RawFrame::new(vec![1.0, 2.0, 3.0]).unwrap(),
                    reference: None,
                    calibrated: None,
                    snv: None,
                },
                SampleMetadata::default(),
            )
            .unwrap();
        store
    }
    fn assert_same_records(a: &MeasurementStore, b: &MeasurementStore) {
        let (a, b) = (a.all(), b.all());
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.sequence(), y.sequence());
            assert_eq!(x.kind(), y.kind());
            assert_eq!(x.raw(), y.raw());
            assert_eq!(x.calibrated(), y.calibrated());
            assert_eq!(x.snv(), y.snv());
            assert_eq!(x.metadata(), y.metadata());
            assert_eq!(x.reference().map(|r| r.id()), y.reference().map(|r| r.id()));
        }
    }
    #[test]
    fn export_then_import_preserves_every_field() {
        let original = session();
        let table = export_session(&original, &channels());
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.header().len(), 3 + 3 + 1 + 3 + 3 + 5);
        let restored = MeasurementStore::new(3);
        let summary = import_session(&table, ImportMode::Verbatim, &restored).unwrap();
        assert_eq!(summary.records, 4);
        assert_eq!(summary.references, 1);
        assert_same_records(&original, &restored);
    }
    #[test]
    fn replay_recomputes_identical_values() {
        let original = session();
        let table = export_session(&original, &channels());
        let restored = MeasurementStore::new(3);
        import_session(&table, ImportMode::Replay, &restored).unwrap();
        assert_same_records(&original, &restored);
    }
    #[test]
    fn verbatim_keeps_values_replay_discards_them() {
        let mut table = export_session(&session(), &channels());
        table.rows[1].calibrated = Some(vec![9.0, 9.0, 9.0]);
        let verbatim = MeasurementStore::new(3);
        import_session(&table, ImportMode::Verbatim, &verbatim).unwrap();
        assert_eq!(
            verbatim.get(2).unwrap().calibrated().unwrap().values(),
            &[9.0, 9.0, 9.0]
        );
        let replayed = MeasurementStore::new(3);
        import_session(&table, ImportMode::Replay, &replayed).unwrap();
        assert_ne!(
            replayed.get(2).unwrap().calibrated().unwrap().values(),
            &[9.0, 9.0, 9.0]
        );
    }
    #[test]
    fn missing_sequences_are_assigned_after_the_previous_row() {
        let mut table = export_session(&session(), &channels());
        table.rows[1].sequence = None;
        table.rows[2].sequence = Some(10);
        table.rows[3].sequence = None;
        let store = MeasurementStore::new(3);
        import_session(&table, ImportMode::Verbatim, &store).unwrap();
        let seqs: Vec<u64> = store.all().iter().map(|r| r.sequence()).collect();
        assert_eq!(seqs, vec![1, 2, 10, 11]);
    }
    #[test]
    fn replay_reports_rows_it_cannot_process() {
        let mut table = export_session(&session(), &channels());
        // same counts as the reference: calibrates to a flat spectrum
        table.rows[1].raw = table.rows[0].raw.clone();
        let store = MeasurementStore::new(3);
        let summary = import_session(&table, ImportMode::Replay, &store).unwrap();
        assert_eq!(summary.records, 4);
        assert_eq!(summary.issues.len(), 2);
        assert!(matches!(summary.issues[0], (2, ScanError::ZeroVariance)));
        assert!(matches!(summary.issues[1], (4, ScanError::NoReferenceSet)));
        let flat = store.get(2).unwrap();
        assert!(flat.calibrated().is_some());
        assert!(flat.snv().is_none());
        let verbatim = import_session(&table, ImportMode::Verbatim, &store).unwrap();
        assert!(verbatim.issues.is_empty());
    }
    #[test]
    fn inconsistent_spectra_report_their_row() {
        let mut table = export_session(&session(), &channels());
        table.rows[3].calibrated = Some(vec![1.0, 2.0, 3.0]);
        let store = MeasurementStore::new(3);
        assert!(matches!(
            import_session(&table, ImportMode::Verbatim, &store),
            Err(ScanError::Import { row: 4, .. })
        ));
        assert!(store.is_empty());
    }
    #[test]
    fn bad_rows_leave_store_untouched() {
        let store = session();
        let mut table = export_session(&store, &channels());
        table.rows[2].reference_id = Some(77);
        let err = import_session(&table, ImportMode::Verbatim, &store).unwrap_err();
        assert!(matches!(err, ScanError::Import { row: 3, .. }));
        assert_eq!(store.len(), 4);
        let mut table = export_session(&store, &channels());
        table.rows[3].sequence = Some(1);
        assert!(matches!(
            import_session(&table, ImportMode::Verbatim, &store),
            Err(ScanError::Import { row: 4, .. })
        ));
    }
}
