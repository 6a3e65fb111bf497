//! Standard Normal Variate transform.
//!
//! Uses the population standard deviation (divide by `n`), which is what the
//! scanner's reference tooling computed; prototypes are normalized the same way.
use ndarray::ArrayView1;
use crate::scanner::{CalibratedSpectrum, ScanError};
/// Relative threshold below which a spectrum counts as flat.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;
/// Zero-mean, unit-variance spectrum, one value per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SnvSpectrum(Vec<f64>);
impl SnvSpectrum {
    /// Wraps values that were computed elsewhere, e.g. read back from a session table.
    pub fn from_values(values: Vec<f64>) -> Result<Self, ScanError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScanError::InvalidFrame {
                reason: "SNV spectrum holds a non-finite value".into(),
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
pub fn snv(spectrum: &CalibratedSpectrum) -> Result<SnvSpectrum, ScanError> {
    snv_transform(spectrum.values()).map(SnvSpectrum)
}
/// `(x - mean) / std` over the channels of `values`.
pub fn snv_transform(values: &[f64]) -> Result<Vec<f64>, ScanError> {
    let view = ArrayView1::from(values);
    let Some(mean) = view.mean() else {
        return Err(ScanError::ZeroVariance);
    };
    let std = view.std(0.0);
    if !std.is_finite() || std <= ZERO_VARIANCE_TOLERANCE * (1.0 + mean.abs()) {
        return Err(ScanError::ZeroVariance);
    }
    Ok(view.mapv(|x| (x - mean) / std).to_vec())
}
#[cfg(test)]
mod tests {
    use super::*;
    fn calibrated(values: &[f64]) -> CalibratedSpectrum {
        CalibratedSpectrum::from_values(values.to_vec()).unwrap()
    }
    #[test]
    fn matches_population_formula() {
        let out = snv(&calibrated(&[1.0, 2.0, 3.0])).unwrap();
        let std = (2.0_f64 / 3.0).sqrt();
        for (got, x) in out.values().iter().zip([1.0, 2.0, 3.0]) {
            assert!((got - (x - 2.0) / std).abs() < 1e-12);
        }
    }
    #[test]
    fn result_has_zero_mean_unit_variance() {
        let out = snv_transform(&[0.21, 0.35, 0.18, 0.44, 0.29]).unwrap();
        let n = out.len() as f64;
        let mean = out.iter().sum::<f64>() / n;
        let var = out.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }
    #[test]
    fn flat_single_and_empty_spectra_have_no_snv() {
        assert!(matches!(
            snv(&calibrated(&[5.0, 5.0, 5.0])),
            Err(ScanError::ZeroVariance)
        ));
        assert!(matches!(
            snv(&calibrated(&[0.7])),
            Err(ScanError::ZeroVariance)
        ));
        assert!(matches!(snv_transform(&[]), Err(ScanError::ZeroVariance)));
    }
    #[test]
    fn scale_and_offset_do_not_change_shape() {
        let base = snv_transform(&[1.0, 4.0, 2.0, 8.0]).unwrap();
        let shifted = snv_transform(&[13.0, 22.0, 16.0, 34.0]).unwrap();
        for (a, b) in base.iter().zip(&shifted) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
