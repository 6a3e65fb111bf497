//! Nearest-prototype plastic heuristic.
//!
//! This is an experiment, not a trained model. Every [`Classification`]
//! says so, and consumers are expected to show that marker.
use std::cmp::Ordering;
use std::fmt;
use ndarray::ArrayView1;
use crate::scanner::snv::snv_transform;
use crate::scanner::{ScanError, SnvSpectrum};
pub const EXPERIMENTAL_TAG: &str = "[experimental]";
/// A labelled representative spectrum, stored SNV-normalized.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassPrototype {
    label: String,
    snv: SnvSpectrum,
}
impl ClassPrototype {
    /// Normalizes `spectrum` so prototypes can be given in any scale.
    pub fn from_spectrum(label: impl Into<String>, spectrum: &[f64]) -> Result<Self, ScanError> {
        let label = label.into();
        let values = snv_transform(spectrum).map_err(|_| {
            ScanError::Config(format!("prototype '{label}' is flat and cannot be normalized"))
        })?;
        Ok(Self {
            label,
            snv: SnvSpectrum::from_values(values)?,
        })
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn snv(&self) -> &SnvSpectrum {
        &self.snv
    }
}
#[derive(Clone, Debug, PartialEq)]
pub struct ClassScore {
    pub label: String,
    /// Pearson correlation with the prototype, in `[-1, 1]`.
    pub score: f64,
    /// Euclidean distance between the two SNV spectra.
    pub distance: f64,
}
/// Prototypes ranked by similarity, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    ranking: Vec<ClassScore>,
}
impl Classification {
    pub fn ranking(&self) -> &[ClassScore] {
        &self.ranking
    }
    pub fn best(&self) -> Option<&ClassScore> {
        self.ranking.first()
    }
    pub fn is_experimental(&self) -> bool {
        true
    }
}
impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{EXPERIMENTAL_TAG}")?;
        for entry in &self.ranking {
            write!(f, " {}={:.3}", entry.label, entry.score)?;
        }
        Ok(())
    }
}
pub struct Classifier {
    prototypes: Vec<ClassPrototype>,
}
impl Classifier {
    pub fn new(prototypes: Vec<ClassPrototype>) -> Result<Self, ScanError> {
        let Some(first) = prototypes.first() else {
            return Err(ScanError::Config("classifier needs at least one prototype".into()));
        };
        let expected = first.snv.len();
        if let Some(odd) = prototypes.iter().find(|p| p.snv.len() != expected) {
            return Err(ScanError::PrototypeShapeMismatch {
                label: odd.label.clone(),
                expected,
                actual: odd.snv.len(),
            });
        }
        Ok(Self { prototypes })
    }
    pub fn channels(&self) -> usize {
        self.prototypes[0].snv.len()
    }
    pub fn prototypes(&self) -> &[ClassPrototype] {
        &self.prototypes
    }
    /// Ranks every prototype against `spectrum`.
    ///
    /// The input is re-normalized first, so a spectrum built with
    /// [`SnvSpectrum::from_values`] that is not zero-mean and unit-variance
    /// still scores as a correlation.
    pub fn classify(&self, spectrum: &SnvSpectrum) -> Result<Classification, ScanError> {
        if let Some(prototype) = self.prototypes.iter().find(|p| p.snv.len() != spectrum.len()) {
            return Err(ScanError::PrototypeShapeMismatch {
                label: prototype.label.clone(),
                expected: prototype.snv.len(),
                actual: spectrum.len(),
            });
        }
        let normalized = snv_transform(spectrum.values())?;
        let input = ArrayView1::from(normalized.as_slice());
        let n = input.len() as f64;
        let mut ranking = Vec::with_capacity(self.prototypes.len());
        for prototype in &self.prototypes {
            let reference = ArrayView1::from(prototype.snv.values());
            let diff = &input - &reference;
            ranking.push(ClassScore {
                label: prototype.label.clone(),
                score: input.dot(&reference) / n,
                distance: diff.dot(&diff).sqrt(),
            });
        }
        // stable: equal scores keep configuration order
        ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(Classification { ranking })
    }
}
