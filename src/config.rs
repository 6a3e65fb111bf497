// src/config.rs
use std::fs;
use std::path::Path;
use std::time::Duration;
use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use crate::scanner::{
    ChannelMap, ClassPrototype, Classifier, ScanError, SerialSettings, SyntheticDeviceLink,
    WireFormat,
};
/// LED wavelengths of the stock scanner board, in nanometres.
pub const DEFAULT_WAVELENGTHS_NM: [u32; 8] = [940, 1050, 1200, 1300, 1450, 1550, 1650, 1720];
/// Rough reflectance shapes of common plastics over the stock wavelengths.
static DEFAULT_PROTOTYPES: Lazy<Vec<PrototypeConfig>> = Lazy::new(|| {
    [
        ("PET", [0.62, 0.60, 0.55, 0.58, 0.50, 0.52, 0.47, 0.49]),
        ("HDPE", [0.70, 0.69, 0.58, 0.66, 0.54, 0.60, 0.50, 0.41]),
        ("PP", [0.66, 0.65, 0.56, 0.63, 0.55, 0.59, 0.49, 0.45]),
        ("PS", [0.58, 0.57, 0.53, 0.55, 0.51, 0.50, 0.43, 0.47]),
    ]
    .into_iter()
    .map(|(label, spectrum)| PrototypeConfig {
        label: label.to_string(),
        spectrum: spectrum.to_vec(),
    })
    .collect()
});
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port, e.g. `/dev/ttyACM0` or `COM4`. `None` selects the synthetic device.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub settle_ms: u64,
    pub wire: WireFormat,
}
impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            timeout_ms: 1000,
            settle_ms: 1000,
            wire: WireFormat::default(),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub baseline: Vec<f64>,
    pub noise_min: f64,
    pub noise_max: f64,
    pub seed: Option<u64>,
}
impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            baseline: vec![0.2278, 0.2264, 0.2178, 0.2379, 0.2276, 0.2281, 0.2298, 0.2264],
            noise_min: 0.0015,
            noise_max: 0.0080,
            seed: None,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrototypeConfig {
    pub label: String,
    pub spectrum: Vec<f64>,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub device: DeviceConfig,
    pub wavelengths_nm: Vec<u32>,
    pub synthetic: SyntheticConfig,
    pub prototypes: Vec<PrototypeConfig>,
    /// Material labels offered to the user before any are typed in.
    pub materials: Vec<String>,
}
impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            wavelengths_nm: DEFAULT_WAVELENGTHS_NM.to_vec(),
            synthetic: SyntheticConfig::default(),
            prototypes: DEFAULT_PROTOTYPES.clone(),
            materials: ["PET", "HDPE", "PVC", "LDPE", "PP", "PS", "reference", "unknown"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
impl ScannerConfig {
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }
    pub fn from_json(text: &str) -> Result<Self, ScanError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
    pub fn to_json_pretty(&self) -> Result<String, ScanError> {
        serde_json::to_string_pretty(self).map_err(|e| ScanError::Config(e.to_string()))
    }
    pub fn validate(&self) -> Result<(), ScanError> {
        let channels = self.channel_map()?;
        if self.synthetic.baseline.len() != channels.len() {
            return Err(ScanError::Config(format!(
                "synthetic baseline has {} values for {} channels",
                self.synthetic.baseline.len(),
                channels.len()
            )));
        }
        if self.device.timeout_ms == 0 {
            return Err(ScanError::Config("device timeout must be positive".into()));
        }
        if self.device.baud_rate == 0 {
            return Err(ScanError::Config("baud rate must be positive".into()));
        }
        if self.device.wire.command.trim().is_empty() {
            return Err(ScanError::Config("wire command is empty".into()));
        }
        // builds both to surface their own errors
        self.synthetic_link()?;
        let classifier = self.classifier()?;
        channels.check(classifier.channels()).map_err(|_| {
            ScanError::PrototypeShapeMismatch {
                label: classifier.prototypes()[0].label().to_string(),
                expected: channels.len(),
                actual: classifier.channels(),
            }
        })
    }
    pub fn channel_map(&self) -> Result<ChannelMap, ScanError> {
        ChannelMap::new(self.wavelengths_nm.clone())
    }
    pub fn classifier(&self) -> Result<Classifier, ScanError> {
        let prototypes = self
            .prototypes
            .iter()
            .map(|p| ClassPrototype::from_spectrum(p.label.as_str(), &p.spectrum))
            .collect::<Result<Vec<_>, _>>()?;
        Classifier::new(prototypes)
    }
    pub fn serial_settings(&self) -> Option<SerialSettings> {
        self.device.port.as_ref().map(|port| SerialSettings {
            port: port.clone(),
            baud_rate: self.device.baud_rate,
            timeout: Duration::from_millis(self.device.timeout_ms),
            settle: Duration::from_millis(self.device.settle_ms),
            wire: self.device.wire.clone(),
        })
    }
    pub fn synthetic_link(&self) -> Result<SyntheticDeviceLink, ScanError> {
        SyntheticDeviceLink::new(
            self.synthetic.baseline.clone(),
            self.synthetic.noise_min,
            self.synthetic.noise_max,
            self.synthetic.seed,
        )
    }
}
