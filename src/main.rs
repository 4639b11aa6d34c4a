use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use ctrv_tracker_rs::evaluation::RmseAccumulator;
use ctrv_tracker_rs::ingest::{load_log, LogRecord};
use ctrv_tracker_rs::simulation::Scenario;
use ctrv_tracker_rs::tracker::{Tracker, TrackerConfig, TrackerEvent, TrackerSnapshot};
use ctrv_tracker_rs::types::SensorKind;

#[derive(Parser, Debug)]
#[command(name = "ctrv_tracker")]
#[command(about = "Replay lidar/radar logs through the CTRV unscented Kalman filter", long_about = None)]
struct Args {
    /// Sensor log (text or JSON lines, optionally .gz)
    #[arg(value_name = "LOG", required_unless_present = "simulate")]
    input: Option<PathBuf>,

    /// Run a synthetic turning scenario instead of reading a log
    #[arg(long, conflicts_with = "input")]
    simulate: bool,

    /// JSON tracker configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Longitudinal acceleration noise std [m/s²]
    #[arg(long)]
    std_a: Option<f64>,

    /// Yaw acceleration noise std [rad/s²]
    #[arg(long)]
    std_yawdd: Option<f64>,

    /// Ignore lidar observations
    #[arg(long, default_value_t = false)]
    no_lidar: bool,

    /// Ignore radar observations
    #[arg(long, default_value_t = false)]
    no_radar: bool,

    /// Write a JSON report with per-step estimates
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct EstimateRow {
    timestamp_us: i64,
    sensor: SensorKind,
    estimate: [f64; 4],
    nis: Option<f64>,
}

#[derive(Serialize)]
struct Report {
    source: String,
    config: TrackerConfig,
    records: usize,
    ignored: usize,
    rmse: Option<[f64; 4]>,
    final_snapshot: TrackerSnapshot,
    estimates: Vec<EstimateRow>,
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TrackerConfig::default(),
    };

    if let Some(std_a) = args.std_a {
        config.process_noise.std_a = std_a;
    }
    if let Some(std_yawdd) = args.std_yawdd {
        config.process_noise.std_yawdd = std_yawdd;
    }
    if args.no_lidar {
        config.use_lidar = false;
    }
    if args.no_radar {
        config.use_radar = false;
    }
    Ok(config)
}

fn run(records: &[LogRecord], config: TrackerConfig, source: String) -> Result<Report> {
    let mut tracker = Tracker::new(config.clone());
    let mut rmse = RmseAccumulator::new();
    let mut estimates = Vec::with_capacity(records.len());
    let mut ignored = 0;

    for record in records {
        let obs = &record.observation;
        let events = tracker
            .process(obs)
            .with_context(|| format!("processing {} observation at {}", obs.kind(), obs.timestamp_us))?;

        let mut nis = None;
        for event in &events {
            match event {
                TrackerEvent::Ignored { .. } => ignored += 1,
                TrackerEvent::Updated { nis: value, .. } => nis = Some(*value),
                _ => {}
            }
        }
        if !tracker.is_initialized() {
            continue;
        }

        let estimate = tracker.filter().get_state().to_cartesian();
        if let Some(gt) = record.ground_truth.as_ref() {
            rmse.add(&estimate, gt);
        }
        estimates.push(EstimateRow {
            timestamp_us: obs.timestamp_us,
            sensor: obs.kind(),
            estimate,
            nis,
        });
    }

    Ok(Report {
        source,
        config,
        records: records.len(),
        ignored,
        rmse: rmse.rmse(),
        final_snapshot: tracker.get_snapshot(),
        estimates,
    })
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let (records, source) = match args.input.as_ref() {
        Some(path) if !args.simulate => (load_log(path)?, path.display().to_string()),
        _ => (Scenario::default().generate(), "simulation".to_string()),
    };

    let report = run(&records, config, source)?;

    println!("Source: {}", report.source);
    println!("  Records: {} ({} ignored)", report.records, report.ignored);
    match report.rmse {
        Some(r) => println!(
            "  RMSE px={:.4} py={:.4} vx={:.4} vy={:.4}",
            r[0], r[1], r[2], r[3]
        ),
        None => println!("  RMSE: no ground truth"),
    }
    for nis in [&report.final_snapshot.lidar_nis, &report.final_snapshot.radar_nis] {
        println!(
            "  NIS {}: {} updates, mean {:.3}, {:.1}% above {:.3}",
            nis.kind,
            nis.count,
            nis.mean,
            nis.fraction_above * 100.0,
            nis.threshold
        );
    }

    if let Some(path) = args.output.as_ref() {
        write_report(path, &report)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
