use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::{json, Value};

use sail_nav_rs::calibration::{self, CalibrationStore, JsonFileStore, MemoryStore};
use sail_nav_rs::command::Command;
use sail_nav_rs::gps_source::NmeaFixDecoder;
use sail_nav_rs::types::{GpsFix, ImuReading, RawWind};
use sail_nav_rs::wind_sensor::WindReadError;
use sail_nav_rs::{NavConfig, NavEvent, NavPipeline, NavigationSnapshot, SensorPresence};

/// Replay a recorded sailing session through the navigation pipeline.
#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "session_dir")]
    log: Option<PathBuf>,

    /// Directory of recorded sessions to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// JSON file overriding pipeline thresholds
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration file; loaded at start and written by calibration commands
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Seconds between snapshots
    #[arg(long, default_value = "1.0")]
    tick: f64,

    /// Print only the per-session summary, not every snapshot
    #[arg(long, default_value_t = false)]
    summary: bool,

    /// Treat the GPS as not detected
    #[arg(long, default_value_t = false)]
    no_gps: bool,

    /// Treat the IMU as not detected
    #[arg(long, default_value_t = false)]
    no_imu: bool,

    /// Treat the anemometer as not detected
    #[arg(long, default_value_t = false)]
    no_wind: bool,
}

#[derive(Deserialize)]
struct Reading {
    timestamp: f64,
    #[serde(default)]
    gps: Option<GpsFix>,
    /// Raw NMEA text, decoded in place of a pre-parsed fix
    #[serde(default)]
    nmea: Option<String>,
    #[serde(default)]
    imu: Option<ImuReading>,
    #[serde(default)]
    wind: Option<RawWind>,
    /// Modbus status code of a failed wind read
    #[serde(default)]
    wind_error: Option<u8>,
    #[serde(default)]
    command: Option<Value>,
    #[serde(default)]
    link_quality: Option<i32>,
}

#[derive(Deserialize)]
struct LogFile {
    readings: Vec<Reading>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<NavConfig> {
    match path {
        Some(p) => Ok(NavConfig::from_json(&fs::read_to_string(p)?)?),
        None => Ok(NavConfig::default()),
    }
}

fn run_once(path: &Path, args: &Args, config: &NavConfig) -> anyhow::Result<Value> {
    let log = load_log(path)?;
    if args.tick <= 0.0 {
        anyhow::bail!("--tick must be positive, got {}", args.tick);
    }

    let mut store: Box<dyn CalibrationStore> = match &args.calibration {
        Some(p) => Box::new(JsonFileStore::new(p)),
        None => Box::new(MemoryStore::default()),
    };
    let presence = SensorPresence { gps: !args.no_gps, imu: !args.no_imu, wind: !args.no_wind };
    let mut nav = NavPipeline::new(config.clone(), presence, calibration::load_or_default(store.as_mut()));
    let mut decoder = NmeaFixDecoder::new();

    let mut snapshots: Vec<NavigationSnapshot> = Vec::new();
    let mut event_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut rejected_commands = 0usize;
    let mut next_tick: Option<f64> = None;

    for r in &log.readings {
        let now = r.timestamp;
        let mut events: Vec<NavEvent> = Vec::new();

        if let Some(fix) = &r.gps {
            events.extend(nav.feed_gps(fix, now));
        }
        if let Some(text) = &r.nmea {
            let mut bytes = text.as_bytes();
            while !bytes.is_empty() {
                let (consumed, evs) = nav.feed_nmea(&mut decoder, bytes, now);
                events.extend(evs);
                bytes = &bytes[consumed..];
            }
        }
        if let Some(imu) = &r.imu {
            events.extend(nav.feed_imu(imu, now));
        }
        if let Some(wind) = r.wind {
            events.extend(nav.feed_wind(Ok(wind), now));
        } else if let Some(code) = r.wind_error {
            events.extend(nav.feed_wind(Err(WindReadError::from_modbus_code(code)), now));
        }
        if let Some(raw) = &r.command {
            match Command::parse(&raw.to_string()).and_then(|cmd| nav.apply_command(cmd, store.as_mut())) {
                Ok(event) => {
                    log::info!("t={:.1}s command applied: {:?}", now, event);
                    events.push(event);
                }
                Err(e) => {
                    log::warn!("t={:.1}s command rejected: {}", now, e);
                    rejected_commands += 1;
                }
            }
        }

        for e in &events {
            *event_counts.entry(e.name()).or_default() += 1;
        }

        let due = next_tick.get_or_insert(now);
        if now >= *due {
            *due = now + args.tick;
            snapshots.push(nav.snapshot(now, r.link_quality));
        }
    }

    let sog_max = snapshots.iter().map(|s| s.sog).filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
    let health = nav.health();
    let calibration = nav.calibration();

    let mut result = json!({
        "log": path.display().to_string(),
        "replayed_at": chrono::Utc::now().to_rfc3339(),
        "readings": log.readings.len(),
        "snapshot_count": snapshots.len(),
        "sog_max": sog_max,
        "stats": nav.stats(),
        "events": event_counts,
        "rejected_commands": rejected_commands,
        "failures": {
            "gps": health.gps.failures(),
            "imu": health.imu.failures(),
            "wind": health.wind.failures(),
        },
        "calibration": {
            "heel_angle_delta": calibration.heel_angle_delta,
            "compass_offset_delta": calibration.compass_offset_delta,
        },
    });
    if !args.summary {
        result["snapshots"] = serde_json::to_value(&snapshots)?;
    }
    Ok(result)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let mut results = Vec::new();

    if let Some(dir) = args.session_dir.as_ref() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args, &config) {
                Ok(res) => results.push(res),
                Err(e) => log::error!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args, &config)?);
    } else {
        anyhow::bail!("Provide --log or --session-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
