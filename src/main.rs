//! CLI entry point for sirius-daq
//!
//! Runs against the simulated device described in the `[simulation]` section
//! of the configuration file.
//!
//! # Usage
//!
//! ```bash
//! sirius-daq config
//! sirius-daq devices
//! sirius-daq channels
//! sirius-daq --config config/sirius.toml acquire --seconds 2 --output labeled
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use sirius_daq::config::{SiriusConfig, DEFAULT_CONFIG_PATH};
use sirius_daq::driver::simulated::{SimulatedDevice, SimulatedInstance};
use sirius_daq::logging;
use sirius_daq::session::{Acquisition, AcquisitionSession, OutputFormat};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sirius-daq")]
#[command(about = "Configure and acquire from Sirius DAQ devices", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,

    /// List devices visible to the driver
    Devices,

    /// Connect and list channels with their amplifier properties
    Channels,

    /// Configure channels from the config file and run one acquisition
    Acquire {
        /// Acquisition length in seconds (overrides the config file)
        #[arg(long)]
        seconds: Option<f64>,

        /// Requested sample rate in Hz (overrides the config file)
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Output shape (overrides the config file)
        #[arg(long, value_enum)]
        output: Option<OutputFormat>,

        /// Write the acquired data as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SiriusConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config)?;

    let instance =
        SimulatedInstance::with_devices(vec![SimulatedDevice::new(config.simulation.clone())]);
    let mut session = AcquisitionSession::new(Box::new(instance));

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Devices => list_devices(&session),
        Commands::Channels => list_channels(&mut session, &config),
        Commands::Acquire {
            seconds,
            sample_rate,
            output,
            json,
        } => acquire(&mut session, &config, seconds, sample_rate, output, json),
    }
}

fn list_devices(session: &AcquisitionSession) -> Result<()> {
    for device in session.list_available_devices() {
        println!(
            "Name: {} Connection string: {}",
            device.name, device.connection_string
        );
    }
    Ok(())
}

fn connect(session: &mut AcquisitionSession, config: &SiriusConfig) -> Result<()> {
    session
        .try_connect(&config.device.connection_string)
        .with_context(|| format!("Cannot connect to {}", config.device.connection_string))
}

fn list_channels(session: &mut AcquisitionSession, config: &SiriusConfig) -> Result<()> {
    connect(session, config)?;
    for channel in session.channel_listing()? {
        print!("{}", channel);
    }
    Ok(())
}

fn acquire(
    session: &mut AcquisitionSession,
    config: &SiriusConfig,
    seconds: Option<f64>,
    sample_rate: Option<f64>,
    output: Option<OutputFormat>,
    json_path: Option<PathBuf>,
) -> Result<()> {
    let duration = match seconds {
        Some(s) => Duration::try_from_secs_f64(s)
            .with_context(|| format!("Invalid acquisition length: {} s", s))?,
        None => config.acquisition.duration,
    };
    let output = output.unwrap_or(config.acquisition.output);

    connect(session, config)?;
    let rate = session.set_sample_rate(sample_rate.unwrap_or(config.device.sample_rate))?;

    let report = session.configure_channels(config.channel_map())?;
    for rejected in &report.rejected {
        warn!("{}", rejected);
    }

    let data = session.acquire_processed(duration, output)?;
    info!(
        sample_rate = rate,
        samples = data.sample_count(),
        "Acquisition finished"
    );
    print_summary(&data);

    if let Some(path) = json_path {
        let file =
            File::create(&path).with_context(|| format!("Cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &to_json(&data))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(data: &Acquisition) {
    match data {
        Acquisition::Array(array) => {
            println!("{} samples x {} channels", array.nrows(), array.ncols());
            for (column, series) in array.columns().into_iter().enumerate() {
                let (min, max) = min_max(series.iter().copied());
                println!("  column {:2}: min {:>12.6} max {:>12.6}", column, min, max);
            }
        }
        Acquisition::Labeled(labeled) => {
            for (name, entry) in labeled {
                let (min, max) = min_max(entry.signal.iter().copied());
                println!(
                    "  {:20} [{:6}] {} samples, min {:>12.6} max {:>12.6}",
                    name,
                    entry.unit,
                    entry.signal.len(),
                    min,
                    max
                );
            }
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn to_json(data: &Acquisition) -> Value {
    match data {
        Acquisition::Array(array) => {
            let rows: Vec<Vec<f64>> = array.rows().into_iter().map(|r| r.to_vec()).collect();
            json!({ "data": rows })
        }
        Acquisition::Labeled(labeled) => {
            let mut map = Map::new();
            for (name, entry) in labeled {
                map.insert(
                    name.clone(),
                    json!({ "signal": entry.signal.to_vec(), "unit": entry.unit }),
                );
            }
            Value::Object(map)
        }
    }
}
