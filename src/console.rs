// src/console.rs
use std::fmt::Write as _;
use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use crate::scanner::{ImportMode, MeasurementRecord, SampleMetadata};
use crate::types::*;

pub const HELP: &str = "\
commands:
  connect sim|hw                    switch between synthetic and serial device
  cal [material]                    capture a new calibration reference
  clear                             forget the calibration reference
  measure [material] [key=value..]  take a measurement (keys: name, color, note, known)
  edit <seq> [material] [key=value..]
  classify [seq]                    rank prototypes for a measurement (default: latest)
  last [n]                          show the last n records (default 5)
  materials                         list known material labels
  export <file.csv>
  import <file.csv> [replay]
  help
  quit";

#[derive(Clone, Debug)]
pub enum Input {
    Command(ScanCommand),
    Help,
    Empty,
}

/// Parses one console line.
pub fn parse_line(line: &str) -> Result<Input> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "" => return Ok(Input::Empty),
        "help" | "?" => return Ok(Input::Help),
        "quit" | "exit" => ScanCommand::Shutdown,
        "connect" => match rest {
            "sim" | "simulation" | "synthetic" => ScanCommand::Connect(ConnectionMode::Simulation),
            "hw" | "hardware" | "serial" => ScanCommand::Connect(ConnectionMode::Hardware),
            other => bail!("unknown connection mode '{other}'"),
        },
        "cal" | "calibrate" => {
            let rest = if rest.is_empty() { "reference" } else { rest };
            ScanCommand::Calibrate(parse_metadata(rest)?)
        }
        "clear" => ScanCommand::ClearCalibration,
        "measure" | "m" => ScanCommand::Measure(parse_metadata(rest)?),
        "edit" => {
            let (seq, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            ScanCommand::EditMetadata {
                sequence: parse_sequence(seq)?,
                metadata: parse_metadata(rest)?,
            }
        }
        "classify" => match rest {
            "" => ScanCommand::Classify(None),
            seq => ScanCommand::Classify(Some(parse_sequence(seq)?)),
        },
        "last" | "history" => match rest {
            "" => ScanCommand::ShowLast(5),
            n => ScanCommand::ShowLast(n.parse().with_context(|| format!("bad count '{n}'"))?),
        },
        "materials" => ScanCommand::Materials,
        "export" => ScanCommand::Export(path_arg(rest)?),
        "import" => {
            let (path, mode) = match rest.rsplit_once(char::is_whitespace) {
                Some((path, "replay")) => (path.trim(), ImportMode::Replay),
                Some((path, "verbatim")) => (path.trim(), ImportMode::Verbatim),
                _ => (rest, ImportMode::Verbatim),
            };
            ScanCommand::Import(path_arg(path)?, mode)
        }
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(Input::Command(cmd))
}

fn parse_sequence(text: &str) -> Result<u64> {
    text.trim()
        .trim_start_matches('#')
        .parse()
        .with_context(|| format!("bad sequence number '{text}'"))
}

fn path_arg(text: &str) -> Result<PathBuf> {
    if text.is_empty() {
        bail!("missing file path");
    }
    Ok(PathBuf::from(text))
}

/// `[material] [name=..] [color=..] [known=yes|no] [note=free text to end of line]`
fn parse_metadata(text: &str) -> Result<SampleMetadata> {
    let (head, note) = match text.find("note=") {
        Some(at) => (&text[..at], Some(text[at + "note=".len()..].trim())),
        None => (text, None),
    };
    let mut material = None;
    let mut name = String::new();
    let mut color = String::new();
    let mut known = None;
    for token in head.split_whitespace() {
        match token.split_once('=') {
            Some(("name", v)) => name = v.to_string(),
            Some(("color", v)) | Some(("colour", v)) => color = v.to_string(),
            Some(("known", v)) => {
                known = Some(match v.to_ascii_lowercase().as_str() {
                    "yes" | "y" | "true" | "1" => true,
                    "no" | "n" | "false" | "0" => false,
                    _ => bail!("bad known flag '{v}'"),
                })
            }
            Some((key, _)) => bail!("unknown field '{key}'"),
            None if material.is_none() => material = Some(token),
            None => bail!("unexpected '{token}'; use name=, color= or note="),
        }
    }
    let mut metadata = SampleMetadata::labelled(material.unwrap_or("unknown"));
    if let Some(known) = known {
        metadata.known = known;
    }
    metadata.name = name;
    metadata.color = color;
    metadata.note = note.unwrap_or_default().to_string();
    Ok(metadata)
}

fn summary(record: &MeasurementRecord) -> String {
    let md = record.metadata();
    let mut line = format!("#{} {} {}", record.sequence(), record.kind(), md.material);
    if md.known {
        line.push_str(" (known)");
    }
    if !md.name.is_empty() {
        write!(line, " name={}", md.name).ok();
    }
    if !md.color.is_empty() {
        write!(line, " color={}", md.color).ok();
    }
    let values = |v: &[f64]| {
        v.iter()
            .map(|x| format!("{x:.3}"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    write!(line, "\n  raw  [{}]", values(record.raw().values())).ok();
    if let Some(reference) = record.reference() {
        write!(line, "\n  ref  #{}", reference.id()).ok();
    }
    if let Some(snv) = record.snv() {
        write!(line, "\n  snv  [{}]", values(snv.values())).ok();
    }
    if !md.note.is_empty() {
        write!(line, "\n  note {}", md.note).ok();
    }
    line
}

/// Text shown for an engine message.
pub fn render(msg: &ScanMessage) -> String {
    match msg {
        ScanMessage::Log(text) => text.clone(),
        ScanMessage::Status { mode, device } => format!("device: {device} ({mode})"),
        ScanMessage::Calibrated(record) => format!("reference captured\n{}", summary(record)),
        ScanMessage::Measured { record, issue } => match issue {
            Some(issue) => format!("{}\n  ⚠️ {issue}", summary(record)),
            None => summary(record),
        },
        ScanMessage::MetadataUpdated(record) => format!("updated {}", summary(record)),
        ScanMessage::Classified { sequence, result } => {
            let mut text = format!("#{sequence} {result}");
            for (rank, entry) in result.ranking().iter().enumerate() {
                write!(
                    text,
                    "\n  {}. {:<6} score {:+.3}  distance {:.3}",
                    rank + 1,
                    entry.label,
                    entry.score,
                    entry.distance
                )
                .ok();
            }
            text
        }
        ScanMessage::History(records) if records.is_empty() => "no records yet".to_owned(),
        ScanMessage::History(records) => records
            .iter()
            .map(summary)
            .collect::<Vec<_>>()
            .join("\n"),
        ScanMessage::Materials(materials) => materials.join(", "),
        ScanMessage::Exported { path, rows } => format!("💾 {rows} rows -> {}", path.display()),
        ScanMessage::Imported { path, records, references, issues } => {
            let mut text = format!(
                "loaded {records} records ({references} references) from {}; calibration cleared",
                path.display()
            );
            for issue in issues {
                write!(text, "\n  ⚠️ {issue}").ok();
            }
            text
        }
        ScanMessage::Error(err) => format!("❌ {err}"),
        ScanMessage::Stopped => "bye".to_owned(),
    }
}
