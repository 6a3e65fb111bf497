// src/recorder.rs
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use log::info;
use crate::scanner::{ChannelMap, RecordKind, SampleMetadata, ScanError, SessionTable, TableRow};
/// Writes `table` as CSV. Floats use the shortest text that parses back to the same value.
pub fn write_table<W: Write>(table: &SessionTable, out: W) -> Result<(), ScanError> {
    let mut w = BufWriter::new(out);
    let header = table.header();
    writeln!(w, "{}", header.join(","))?;
    for row in &table.rows {
        let mut cells: Vec<String> = Vec::with_capacity(header.len());
        cells.push(row.sequence.map(|s| s.to_string()).unwrap_or_default());
        cells.push(row.timestamp_ns.to_string());
        cells.push(row.kind.to_string());
        cells.extend(row.raw.iter().map(|v| v.to_string()));
        cells.push(row.reference_id.map(|id| id.to_string()).unwrap_or_default());
        push_optional(&mut cells, row.calibrated.as_deref(), table.channels.len());
        push_optional(&mut cells, row.snv.as_deref(), table.channels.len());
        let md = &row.metadata;
        cells.push(quote(&md.material));
        cells.push(if md.known { "1" } else { "0" }.to_string());
        cells.push(quote(&md.name));
        cells.push(quote(&md.color));
        cells.push(quote(&md.note));
        writeln!(w, "{}", cells.join(","))?;
    }
    w.flush()?;
    Ok(())
}
pub fn save_table(table: &SessionTable, path: &Path) -> Result<(), ScanError> {
    write_table(table, File::create(path)?)?;
    info!("💾 wrote {} rows to {}", table.rows.len(), path.display());
    Ok(())
}
pub fn load_table(path: &Path) -> Result<SessionTable, ScanError> {
    let text = fs::read_to_string(path)?;
    let table = read_table(&text)?;
    info!("read {} rows from {}", table.rows.len(), path.display());
    Ok(table)
}
/// Parses CSV produced by [`write_table`]. The channel set comes from the header.
pub fn read_table(text: &str) -> Result<SessionTable, ScanError> {
    let mut records = split_records(text)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| ScanError::import(0, "file is empty"))?;
    let channels = channels_from_header(&header)?;
    let n = channels.len();
    let mut table = SessionTable::new(channels);
    for (index, cells) in records.enumerate() {
        let row_no = index + 1;
        if cells.len() != header.len() {
            return Err(ScanError::import(
                row_no,
                format!("expected {} cells, found {}", header.len(), cells.len()),
            ));
        }
        let err = |reason: String| ScanError::import(row_no, reason);
        let mut col = cells.iter();
        let mut next = || col.next().map(String::as_str).unwrap_or_default();
        let sequence = optional_u64(next()).map_err(err)?;
        let timestamp_ns = next()
            .parse::<u64>()
            .map_err(|e| err(format!("bad timestamp: {e}")))?;
        let kind = next().parse::<RecordKind>().map_err(err)?;
        let raw = (0..n)
            .map(|_| parse_f64(next()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(err)?;
        let reference_id = optional_u64(next()).map_err(err)?;
        let calibrated = optional_values(&mut next, n).map_err(err)?;
        let snv = optional_values(&mut next, n).map_err(err)?;
        let material = next().to_string();
        let known = parse_flag(next()).map_err(err)?;
        let metadata = SampleMetadata {
            material,
            known,
            name: next().to_string(),
            color: next().to_string(),
            note: next().to_string(),
        };
        table.rows.push(TableRow {
            sequence,
            timestamp_ns,
            kind,
            raw,
            reference_id,
            calibrated,
            snv,
            metadata,
        });
    }
    Ok(table)
}
fn push_optional(cells: &mut Vec<String>, values: Option<&[f64]>, n: usize) {
    match values {
        Some(values) => cells.extend(values.iter().map(|v| v.to_string())),
        None => cells.extend(std::iter::repeat(String::new()).take(n)),
    }
}
fn quote(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
fn channels_from_header(header: &[String]) -> Result<ChannelMap, ScanError> {
    let wavelengths = header
        .iter()
        .skip(3)
        .take_while(|h| h.as_str() != "reference_id")
        .map(|h| {
            h.strip_prefix("nm")
                .and_then(|nm| nm.parse::<u32>().ok())
                .ok_or_else(|| ScanError::import(0, format!("unexpected column '{h}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let channels = ChannelMap::new(wavelengths).map_err(|e| ScanError::import(0, e.to_string()))?;
    if SessionTable::header_for(&channels) != header {
        return Err(ScanError::import(0, "header does not match the session layout"));
    }
    Ok(channels)
}
fn parse_f64(cell: &str) -> Result<f64, String> {
    cell.trim()
        .parse::<f64>()
        .map_err(|e| format!("bad number '{cell}': {e}"))
}
fn optional_u64(cell: &str) -> Result<Option<u64>, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<u64>()
        .map(Some)
        .map_err(|e| format!("bad integer '{cell}': {e}"))
}
/// A block of `n` cells that is either entirely empty or entirely numeric.
fn optional_values<'a>(
    next: &mut impl FnMut() -> &'a str,
    n: usize,
) -> Result<Option<Vec<f64>>, String> {
    let cells: Vec<&str> = (0..n).map(|_| next()).collect();
    if cells.iter().all(|c| c.trim().is_empty()) {
        return Ok(None);
    }
    cells.into_iter().map(parse_f64).collect::<Result<Vec<_>, _>>().map(Some)
}
fn parse_flag(cell: &str) -> Result<bool, String> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(format!("bad known_flag '{other}'")),
    }
}
/// Splits CSV text into records, honouring double-quoted fields.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, ScanError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(ScanError::import(records.len(), "unterminated quoted field"));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
