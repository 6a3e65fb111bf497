// src/engine.rs
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use anyhow::{Context, Result};
use log::{error, info, warn};
use crate::config::ScannerConfig;
use crate::recorder;
use crate::scanner::{DeviceLink, ImportMode, ScanError, ScanPipeline, SerialDeviceLink};
use crate::types::*;

/// Owns the pipeline on a background thread and answers [`ScanCommand`]s.
pub struct Engine {
    pipeline: ScanPipeline<Box<dyn DeviceLink>>,
    config: ScannerConfig,
    mode: ConnectionMode,
    tx: Sender<ScanMessage>,
}

impl Engine {
    /// Starts on the synthetic device; hardware is requested with `Connect`.
    pub fn new(config: ScannerConfig, tx: Sender<ScanMessage>) -> Result<Self> {
        let link = open_link(&config, ConnectionMode::Simulation)?;
        Self::with_link(config, link, ConnectionMode::Simulation, tx)
    }

    pub fn with_link(
        config: ScannerConfig,
        link: Box<dyn DeviceLink>,
        mode: ConnectionMode,
        tx: Sender<ScanMessage>,
    ) -> Result<Self> {
        let channels = config.channel_map().context("invalid wavelength table")?;
        let classifier = config.classifier().context("invalid class prototypes")?;
        let pipeline = ScanPipeline::new(link, channels, classifier)?;
        Ok(Self { pipeline, config, mode, tx })
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn pipeline(&self) -> &ScanPipeline<Box<dyn DeviceLink>> {
        &self.pipeline
    }

    fn send(&self, msg: ScanMessage) {
        self.tx.send(msg).ok();
    }

    fn report(&self, err: anyhow::Error) {
        warn!("{err:#}");
        self.send(ScanMessage::Error(format!("{err:#}")));
    }

    fn send_status(&self) {
        self.send(ScanMessage::Status {
            mode: self.mode,
            device: self.pipeline.link().describe(),
        });
    }

    /// Handles one command; returns `false` once the engine should stop.
    pub fn handle(&mut self, cmd: ScanCommand) -> bool {
        let outcome = match cmd {
            ScanCommand::Shutdown => return false,
            ScanCommand::Connect(mode) => self.connect(mode),
            ScanCommand::Calibrate(metadata) => self
                .pipeline
                .calibrate_reference(metadata)
                .map(|record| self.send(ScanMessage::Calibrated(record)))
                .map_err(|e| self.on_scan_error(e)),
            ScanCommand::ClearCalibration => {
                self.pipeline.clear_calibration();
                self.send(ScanMessage::Log("calibration cleared".to_owned()));
                Ok(())
            }
            ScanCommand::Measure(metadata) => self
                .pipeline
                .measure(metadata)
                .map(|m| {
                    self.send(ScanMessage::Measured {
                        record: m.record,
                        issue: m.issue.map(|e| e.to_string()),
                    })
                })
                .map_err(|e| self.on_scan_error(e)),
            ScanCommand::EditMetadata { sequence, metadata } => self
                .pipeline
                .edit_metadata(sequence, metadata)
                .map(|record| self.send(ScanMessage::MetadataUpdated(record)))
                .map_err(anyhow::Error::from),
            ScanCommand::Classify(sequence) => self.classify(sequence),
            ScanCommand::ShowLast(n) => {
                self.send(ScanMessage::History(self.pipeline.store().last(n)));
                Ok(())
            }
            ScanCommand::Materials => {
                let materials = self.pipeline.store().materials(&self.config.materials);
                self.send(ScanMessage::Materials(materials));
                Ok(())
            }
            ScanCommand::Export(path) => self.export(&path),
            ScanCommand::Import(path, mode) => self.import(&path, mode),
        };
        if let Err(err) = outcome {
            self.report(err);
        }
        true
    }

    fn connect(&mut self, mode: ConnectionMode) -> Result<()> {
        let link = open_link(&self.config, mode)?;
        self.pipeline.replace_link(link)?;
        self.mode = mode;
        self.send(ScanMessage::Log(format!("✅ {mode} connected")));
        self.send_status();
        Ok(())
    }

    /// A lost device drops the engine back to the synthetic source.
    fn on_scan_error(&mut self, err: ScanError) -> anyhow::Error {
        if matches!(err, ScanError::LinkDisconnected { .. }) && self.mode == ConnectionMode::Hardware {
            match self.connect(ConnectionMode::Simulation) {
                Ok(()) => self.send(ScanMessage::Log(
                    "⚠️ device lost, switched to synthetic data".to_owned(),
                )),
                Err(fallback) => error!("synthetic fallback failed: {fallback:#}"),
            }
        }
        anyhow::Error::from(err)
    }

    fn classify(&self, sequence: Option<u64>) -> Result<()> {
        let (sequence, result) = match sequence {
            Some(sequence) => (sequence, self.pipeline.classify(sequence)?),
            None => {
                let (record, result) = self
                    .pipeline
                    .classify_latest()?
                    .context("no measurement with an SNV spectrum yet")?;
                (record.sequence(), result)
            }
        };
        self.send(ScanMessage::Classified { sequence, result });
        Ok(())
    }

    fn export(&self, path: &Path) -> Result<()> {
        let table = self.pipeline.export();
        recorder::save_table(&table, path)
            .with_context(|| format!("export to {}", path.display()))?;
        self.send(ScanMessage::Exported {
            path: path.to_path_buf(),
            rows: table.rows.len(),
        });
        Ok(())
    }

    fn import(&mut self, path: &Path, mode: ImportMode) -> Result<()> {
        let table = recorder::load_table(path)
            .with_context(|| format!("import from {}", path.display()))?;
        let summary = self.pipeline.import(&table, mode)?;
        self.send(ScanMessage::Imported {
            path: path.to_path_buf(),
            records: summary.records,
            references: summary.references,
            issues: summary
                .issues
                .iter()
                .map(|(sequence, issue)| format!("#{sequence}: {issue}"))
                .collect(),
        });
        Ok(())
    }
}

fn open_link(config: &ScannerConfig, mode: ConnectionMode) -> Result<Box<dyn DeviceLink>> {
    match mode {
        ConnectionMode::Simulation => Ok(Box::new(config.synthetic_link()?)),
        ConnectionMode::Hardware => {
            let settings = config
                .serial_settings()
                .context("no serial port configured")?;
            let link = SerialDeviceLink::open(&settings, config.wavelengths_nm.len())
                .with_context(|| format!("❌ connect failed on {}", settings.port))?;
            Ok(Box::new(link))
        }
    }
}

pub fn spawn_thread(
    config: ScannerConfig,
    tx: Sender<ScanMessage>,
    rx_cmd: Receiver<ScanCommand>,
) -> Result<JoinHandle<()>> {
    let mut engine = Engine::new(config, tx)?;
    let handle = thread::Builder::new()
        .name("scan-engine".into())
        .spawn(move || {
            engine.send(ScanMessage::Log("⚙️ Scan engine ready.".to_owned()));
            engine.send_status();
            // a closed command channel also stops the engine
            while let Ok(cmd) = rx_cmd.recv() {
                if !engine.handle(cmd) {
                    break;
                }
            }
            info!("scan engine stopped");
            engine.send(ScanMessage::Stopped);
        })
        .context("spawning scan engine")?;
    Ok(handle)
}
