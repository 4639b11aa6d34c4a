//! Sensor log ingestion
//!
//! Two line-oriented formats are accepted, mixed freely within a file:
//!
//! - whitespace-separated text, one observation per line:
//!   `L px py timestamp_us [gt_px gt_py gt_vx gt_vy [gt_yaw gt_yawrate]]`
//!   `R rho phi rho_dot timestamp_us [gt_px gt_py gt_vx gt_vy [gt_yaw gt_yawrate]]`
//! - JSON lines, one serialized [`LogRecord`] per line.
//!
//! Files ending in `.gz` are decompressed on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::evaluation::GroundTruth;
use crate::types::{Observation, SensorKind};

/// One observation with its optional reference values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub observation: Observation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruth>,
}

fn parse_f64(token: &str, what: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .with_context(|| format!("invalid {what}: {token:?}"))
}

/// Parse one text-format line. Blank lines and `#` comments yield `None`.
pub fn parse_text_line(line: &str) -> Result<Option<LogRecord>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let kind = match tokens.next() {
        Some("L") => SensorKind::Lidar,
        Some("R") => SensorKind::Radar,
        Some(other) => bail!("unknown sensor tag {other:?}"),
        None => return Ok(None),
    };
    let rest: Vec<&str> = tokens.collect();

    let dim = kind.measurement_dim();
    if rest.len() < dim + 1 {
        bail!("{kind} line needs {} values, got {}", dim + 1, rest.len());
    }

    let raw = rest[..dim]
        .iter()
        .map(|t| parse_f64(t, "measurement value"))
        .collect::<Result<Vec<_>>>()?;
    let timestamp_us = rest[dim]
        .parse::<i64>()
        .with_context(|| format!("invalid timestamp: {:?}", rest[dim]))?;
    let observation = Observation::from_raw(kind, &raw, timestamp_us)?;

    // Reference yaw and yaw rate, if present, are not evaluated
    let gt_tokens = &rest[dim + 1..];
    let ground_truth = if gt_tokens.len() >= 4 {
        Some(GroundTruth {
            px: parse_f64(gt_tokens[0], "ground truth px")?,
            py: parse_f64(gt_tokens[1], "ground truth py")?,
            vx: parse_f64(gt_tokens[2], "ground truth vx")?,
            vy: parse_f64(gt_tokens[3], "ground truth vy")?,
        })
    } else if gt_tokens.is_empty() {
        None
    } else {
        bail!("incomplete ground truth: {} values", gt_tokens.len());
    };

    Ok(Some(LogRecord {
        observation,
        ground_truth,
    }))
}

/// Parse a log from any buffered reader
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        let trimmed = line.trim_start();

        let record = if trimmed.starts_with('{') {
            Some(
                serde_json::from_str::<LogRecord>(trimmed)
                    .with_context(|| format!("line {}: invalid JSON record", index + 1))?,
            )
        } else {
            parse_text_line(trimmed).with_context(|| format!("line {}", index + 1))?
        };

        if let Some(record) = record {
            records.push(record);
        }
    }
    Ok(records)
}

/// Load a log file, decompressing `.gz` files
pub fn load_log(path: &Path) -> Result<Vec<LogRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let records = parse_records(BufReader::new(reader))
        .with_context(|| format!("parsing {}", path.display()))?;
    log::info!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
