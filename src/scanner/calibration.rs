use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use log::info;
use ndarray::ArrayView1;
use parking_lot::RwLock;
use crate::scanner::{RawFrame, ScanError};
/// A raw frame captured as the white reference (e.g. a spectralon tile).
#[derive(Debug, PartialEq)]
pub struct CalibrationReference {
    id: u64,
    frame: RawFrame,
}
impl CalibrationReference {
    pub(crate) fn restore(id: u64, frame: RawFrame) -> Self {
        Self { id, frame }
    }
    /// Session-unique identifier, written to exported tables as `reference_id`.
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn frame(&self) -> &RawFrame {
        &self.frame
    }
    pub fn captured_at(&self) -> SystemTime {
        self.frame.timestamp()
    }
    /// `raw[c] / reference[c]` for every channel, or nothing at all.
    pub fn calibrate(&self, frame: &RawFrame) -> Result<CalibratedSpectrum, ScanError> {
        let reference = self.frame.values();
        if frame.num_channels() != reference.len() {
            return Err(ScanError::ChannelMismatch {
                expected: reference.len(),
                actual: frame.num_channels(),
            });
        }
        if let Some(channel) = reference.iter().position(|r| *r == 0.0) {
            return Err(ScanError::CalibrationDivideByZero { channel });
        }
        let ratio = &ArrayView1::from(frame.values()) / &ArrayView1::from(reference);
        // subnormal reference counts can still overflow
        if let Some(channel) = ratio.iter().position(|v| !v.is_finite()) {
            return Err(ScanError::CalibrationDivideByZero { channel });
        }
        Ok(CalibratedSpectrum(ratio.to_vec()))
    }
}
/// Reflectance relative to the reference, one value per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedSpectrum(Vec<f64>);
impl CalibratedSpectrum {
    /// Wraps values that were computed elsewhere, e.g. read back from a session table.
    pub fn from_values(values: Vec<f64>) -> Result<Self, ScanError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::InvalidFrame {
                reason: "calibrated spectrum holds a non-finite value".into(),
            });
        }
        Ok(Self(values))
    }
    pub fn values(&self) -> &[f64] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CalibrationState {
    NoReference,
    Referenced,
}
/// Owns the active calibration reference.
///
/// Replacement swaps an `Arc` under a lock, so a concurrent `calibrate` sees
/// either the old or the new reference in full.
pub struct CalibrationEngine {
    channels: usize,
    active: RwLock<Option<Arc<CalibrationReference>>>,
    next_id: AtomicU64,
}
impl CalibrationEngine {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            active: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn state(&self) -> CalibrationState {
        if self.active.read().is_some() {
            CalibrationState::Referenced
        } else {
            CalibrationState::NoReference
        }
    }
    pub fn set_reference(&self, frame: RawFrame) -> Result<Arc<CalibrationReference>, ScanError> {
        if frame.num_channels() != self.channels {
            return Err(ScanError::ChannelMismatch {
                expected: self.channels,
                actual: frame.num_channels(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let reference = Arc::new(CalibrationReference { id, frame });
        let previous = self.active.write().replace(Arc::clone(&reference));
        match previous {
            Some(old) => info!("calibration reference #{} replaces #{}", id, old.id),
            None => info!("calibration reference #{} set", id),
        }
        Ok(reference)
    }
    pub fn clear_reference(&self) -> Option<Arc<CalibrationReference>> {
        let previous = self.active.write().take();
        if let Some(old) = &previous {
            info!("calibration reference #{} cleared", old.id);
        }
        previous
    }
    pub fn active_reference(&self) -> Option<Arc<CalibrationReference>> {
        self.active.read().clone()
    }
    pub fn calibrate(&self, frame: &RawFrame) -> Result<CalibratedSpectrum, ScanError> {
        self.calibrate_with_reference(frame)
            .map(|(spectrum, _)| spectrum)
    }
    /// Calibrates and reports which reference was used, from a single snapshot.
    pub fn calibrate_with_reference(
        &self,
        frame: &RawFrame,
    ) -> Result<(CalibratedSpectrum, Arc<CalibrationReference>), ScanError> {
        let reference = self.active_reference().ok_or(ScanError::NoReferenceSet)?;
        let spectrum = reference.calibrate(frame)?;
        Ok((spectrum, reference))
    }
    /// Keeps newly issued ids above those restored from an imported session.
    pub(crate) fn reserve_ids_through(&self, id: u64) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn frame(values: &[f64]) -> RawFrame {
        RawFrame::new(values.to_vec()).unwrap()
    }
    #[test]
    fn divides_by_reference_per_channel() {
        let engine = CalibrationEngine::new(2);
        engine.set_reference(frame(&[100.0, 100.0])).unwrap();
        let calibrated = engine.calibrate(&frame(&[50.0, 200.0])).unwrap();
        assert_eq!(calibrated.values(), &[0.5, 2.0]);
    }
    #[test]
    fn zero_reference_channel_fails_whole_frame() {
        let engine = CalibrationEngine::new(2);
        engine.set_reference(frame(&[0.0, 100.0])).unwrap();
        assert!(matches!(
            engine.calibrate(&frame(&[10.0, 20.0])),
            Err(ScanError::CalibrationDivideByZero { channel: 0 })
        ));
    }
    #[test]
    fn calibrate_without_reference_fails() {
        let engine = CalibrationEngine::new(2);
        assert_eq!(engine.state(), CalibrationState::NoReference);
        assert!(matches!(
            engine.calibrate(&frame(&[1.0, 2.0])),
            Err(ScanError::NoReferenceSet)
        ));
    }
    #[test]
    fn replacing_reference_keeps_old_one_intact() {
        let engine = CalibrationEngine::new(2);
        let first = engine.set_reference(frame(&[10.0, 10.0])).unwrap();
        let second = engine.set_reference(frame(&[20.0, 20.0])).unwrap();
        assert_eq!(engine.state(), CalibrationState::Referenced);
        assert!(second.id() > first.id());
        assert_eq!(first.frame().values(), &[10.0, 10.0]);
        let (spectrum, used) = engine
            .calibrate_with_reference(&frame(&[10.0, 10.0]))
            .unwrap();
        assert_eq!(used.id(), second.id());
        assert_eq!(spectrum.values(), &[0.5, 0.5]);
        assert_eq!(first.calibrate(&frame(&[10.0, 10.0])).unwrap().values(), &[1.0, 1.0]);
        engine.clear_reference();
        assert_eq!(engine.state(), CalibrationState::NoReference);
    }
    #[test]
    fn rejects_reference_of_wrong_width() {
        let engine = CalibrationEngine::new(3);
        assert!(matches!(
            engine.set_reference(frame(&[1.0, 2.0])),
            Err(ScanError::ChannelMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }
    #[test]
    fn concurrent_replacement_never_mixes_references() {
        const REPLACEMENTS: u64 = 200;
        let engine = CalibrationEngine::new(3);
        // reference #id holds `id` on every channel
        engine.set_reference(frame(&[1.0; 3])).unwrap();
        let sample = frame(&[6.0; 3]);
        std::thread::scope(|s| {
            s.spawn(|| {
                for id in 2..=REPLACEMENTS {
                    let set = engine.set_reference(frame(&[id as f64; 3])).unwrap();
                    assert_eq!(set.id(), id);
                }
            });
            for _ in 0..3 {
                s.spawn(|| {
                    let mut last_seen = 0;
                    for _ in 0..REPLACEMENTS {
                        let (spectrum, used) = engine.calibrate_with_reference(&sample).unwrap();
                        let id = used.id();
                        assert_eq!(used.frame().values(), &[id as f64; 3]);
                        assert!(spectrum.values().iter().all(|v| *v == 6.0 / id as f64));
                        assert!(id >= last_seen, "reference went back from #{last_seen} to #{id}");
                        last_seen = id;
                    }
                });
            }
        });
        assert_eq!(engine.active_reference().unwrap().id(), REPLACEMENTS);
    }
    #[test]
    fn imported_ids_are_not_reissued() {
        let engine = CalibrationEngine::new(1);
        engine.reserve_ids_through(41);
        assert_eq!(engine.set_reference(frame(&[1.0])).unwrap().id(), 42);
    }
}
