use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::scanner::{DeviceLink, RawFrame, ScanError};
/// Stand-in for the scanner when no port is configured.
///
/// Every frame is the baseline plus a uniform offset per channel drawn from
/// `[noise_min, noise_max)`. With a seed the sequence is reproducible.
pub struct SyntheticDeviceLink {
    baseline: Vec<f64>,
    noise_min: f64,
    noise_max: f64,
    rng: StdRng,
    produced: u64,
}
impl SyntheticDeviceLink {
    pub fn new(
        baseline: Vec<f64>,
        noise_min: f64,
        noise_max: f64,
        seed: Option<u64>,
    ) -> Result<Self, ScanError> {
        if baseline.is_empty() {
            return Err(ScanError::Config("synthetic baseline is empty".into()));
        }
        if baseline.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ScanError::Config(
                "synthetic baseline must hold non-negative finite counts".into(),
            ));
        }
        if !(noise_min.is_finite() && noise_max.is_finite() && noise_min <= noise_max) {
            return Err(ScanError::Config(format!(
                "synthetic noise range [{noise_min}, {noise_max}) is invalid"
            )));
        }
        if baseline.iter().any(|v| v + noise_min < 0.0) {
            return Err(ScanError::Config(
                "synthetic noise would push counts below zero".into(),
            ));
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            baseline,
            noise_min,
            noise_max,
            rng,
            produced: 0,
        })
    }
    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }
    /// Swaps the simulated sample, e.g. to mimic placing a reference tile.
    pub fn set_baseline(&mut self, baseline: Vec<f64>) -> Result<(), ScanError> {
        if baseline.len() != self.baseline.len() {
            return Err(ScanError::ChannelMismatch {
                expected: self.baseline.len(),
                actual: baseline.len(),
            });
        }
        if baseline.iter().any(|v| !v.is_finite() || *v + self.noise_min < 0.0) {
            return Err(ScanError::Config(
                "synthetic baseline must hold non-negative finite counts".into(),
            ));
        }
        self.baseline = baseline;
        Ok(())
    }
    fn noise(&mut self) -> f64 {
        if self.noise_min == self.noise_max {
            self.noise_min
        } else {
            self.rng.gen_range(self.noise_min..self.noise_max)
        }
    }
}
impl DeviceLink for SyntheticDeviceLink {
    fn acquire(&mut self) -> Result<RawFrame, ScanError> {
        let mut values = Vec::with_capacity(self.baseline.len());
        for i in 0..self.baseline.len() {
            let noise = self.noise();
            values.push(self.baseline[i] + noise);
        }
        self.produced += 1;
        debug!("synthetic frame #{}", self.produced);
        RawFrame::new(values)
    }
    fn channel_count(&self) -> usize {
        self.baseline.len()
    }
    fn describe(&self) -> String {
        "synthetic".into()
    }
    fn is_synthetic(&self) -> bool {
        true
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn seeded_frames_are_reproducible_and_bounded() {
        let baseline = vec![0.2278, 0.2264, 0.2178];
        let mut a = SyntheticDeviceLink::new(baseline.clone(), 0.0015, 0.008, Some(7)).unwrap();
        let mut b = SyntheticDeviceLink::new(baseline.clone(), 0.0015, 0.008, Some(7)).unwrap();
        for _ in 0..5 {
            let fa = a.acquire().unwrap();
            let fb = b.acquire().unwrap();
            assert_eq!(fa.values(), fb.values());
            assert_eq!(fa.num_channels(), 3);
            for (v, base) in fa.values().iter().zip(&baseline) {
                assert!(*v >= base + 0.0015 && *v < base + 0.008);
            }
        }
        assert!(a.is_synthetic());
    }
    #[test]
    fn zero_width_noise_returns_baseline_shift() {
        let mut link = SyntheticDeviceLink::new(vec![1.0, 2.0], 0.5, 0.5, None).unwrap();
        assert_eq!(link.acquire().unwrap().values(), &[1.5, 2.5]);
    }
    #[test]
    fn rejects_bad_configuration() {
        assert!(SyntheticDeviceLink::new(vec![], 0.0, 0.1, None).is_err());
        assert!(SyntheticDeviceLink::new(vec![1.0], 0.2, 0.1, None).is_err());
        assert!(SyntheticDeviceLink::new(vec![0.0], -0.1, 0.1, None).is_err());
        let mut link = SyntheticDeviceLink::new(vec![1.0], 0.0, 0.1, None).unwrap();
        assert!(link.set_baseline(vec![1.0, 2.0]).is_err());
        link.set_baseline(vec![3.0]).unwrap();
        assert_eq!(link.baseline(), &[3.0]);
    }
}
