use std::time::{Duration, SystemTime, UNIX_EPOCH};
use crate::scanner::ScanError;
/// Ordered set of LED/detector channels, identified by LED wavelength.
///
/// Channel order defines the position of every value in every spectrum vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    wavelengths_nm: Vec<u32>,
}
impl ChannelMap {
    pub fn new(wavelengths_nm: Vec<u32>) -> Result<Self, ScanError> {
        if wavelengths_nm.is_empty() {
            return Err(ScanError::Config("at least one channel is required".into()));
        }
        let mut seen = wavelengths_nm.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != wavelengths_nm.len() {
            return Err(ScanError::Config(format!(
                "duplicate wavelengths in channel map {wavelengths_nm:?}"
            )));
        }
        Ok(Self { wavelengths_nm })
    }
    pub fn len(&self) -> usize {
        self.wavelengths_nm.len()
    }
    pub fn is_empty(&self) -> bool {
        self.wavelengths_nm.is_empty()
    }
    pub fn wavelengths_nm(&self) -> &[u32] {
        &self.wavelengths_nm
    }
    /// Column-style labels, e.g. `nm940`.
    pub fn labels(&self) -> Vec<String> {
        self.wavelengths_nm.iter().map(|w| format!("nm{w}")).collect()
    }
    pub fn check(&self, actual: usize) -> Result<(), ScanError> {
        if actual != self.len() {
            return Err(ScanError::ChannelMismatch {
                expected: self.len(),
                actual,
            });
        }
        Ok(())
    }
}
/// One acquisition: raw detector counts, one per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    captured_at: SystemTime,
    values: Vec<f64>,
}
impl RawFrame {
    pub fn new(values: Vec<f64>) -> Result<Self, ScanError> {
        Self::captured_at(SystemTime::now(), values)
    }
    pub fn captured_at(captured_at: SystemTime, values: Vec<f64>) -> Result<Self, ScanError> {
        if values.is_empty() {
            return Err(ScanError::InvalidFrame {
                reason: "frame has no channels".into(),
            });
        }
        if let Some((channel, value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(ScanError::InvalidFrame {
                reason: format!("channel {channel} holds {value}, expected a non-negative count"),
            });
        }
        Ok(Self {
            captured_at,
            values,
        })
    }
    pub fn timestamp(&self) -> SystemTime {
        self.captured_at
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn num_channels(&self) -> usize {
        self.values.len()
    }
}
/// Nanoseconds since the Unix epoch; times before the epoch clamp to zero.
pub fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
pub fn from_unix_nanos(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn rejects_negative_and_non_finite_counts() {
        assert!(matches!(
            RawFrame::new(vec![1.0, -0.5]),
            Err(ScanError::InvalidFrame { .. })
        ));
        assert!(matches!(
            RawFrame::new(vec![f64::NAN]),
            Err(ScanError::InvalidFrame { .. })
        ));
        assert!(matches!(
            RawFrame::new(vec![]),
            Err(ScanError::InvalidFrame { .. })
        ));
    }
    #[test]
    fn channel_map_labels_follow_wavelengths() {
        let map = ChannelMap::new(vec![940, 1050]).unwrap();
        assert_eq!(map.labels(), vec!["nm940", "nm1050"]);
        assert!(map.check(2).is_ok());
        assert!(matches!(
            map.check(3),
            Err(ScanError::ChannelMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(ChannelMap::new(vec![940, 940]).is_err());
    }
    #[test]
    fn timestamps_survive_nanosecond_encoding() {
        let t = from_unix_nanos(1_700_000_000_123_456_789);
        assert_eq!(unix_nanos(t), 1_700_000_000_123_456_789);
    }
}
