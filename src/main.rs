//! Command-line front end: locate a discharge from a pulse document, build
//! a pulse document from picks in sensor recordings, or simulate the document
//! a known discharge would produce.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use discharge_locator::api::{render, LocationPipeline, OutputFormat};
use discharge_locator::core::GeodeticPosition;
use discharge_locator::processing::parser::{parse_arrival_time, PulseParser};
use discharge_locator::processing::synthetic::SyntheticScenario;
use discharge_locator::processing::wav::{batch_from_picks, PulsePick, SensorRecording};
use discharge_locator::utils::{init_logging, LocatorConfig, LogConfig, LogLevel};
use discharge_locator::UtmProjection;

#[derive(Parser)]
#[command(
    name = "discharge-locator",
    version,
    about = "Locate acoustic discharges from sensor arrival times"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level process logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Locate the discharge described by a pulse document
    Locate {
        /// Pulse document (JSON)
        pulses: PathBuf,

        /// Locator configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: json, text or csv
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        /// Append diagnostics to this file instead of the configured one
        #[arg(long, conflicts_with = "no_log_file")]
        log_file: Option<PathBuf>,

        /// Do not write a diagnostics file
        #[arg(long)]
        no_log_file: bool,

        /// Search reference sensors in parallel
        #[arg(long)]
        parallel: bool,

        /// Override the acceptance threshold for fit error (m^2)
        #[arg(long)]
        max_fit_error: Option<f64>,
    },

    /// Build a pulse document from onset samples picked in sensor recordings
    Pulses {
        /// Recording and onset sample as PATH@SAMPLE (repeat for each recording)
        #[arg(long = "pick", value_parser = parse_pick, required = true)]
        picks: Vec<PulsePick>,

        /// Write the document here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the metadata stored in a sensor recording
    Inspect {
        /// Recording (WAV)
        recording: PathBuf,
    },

    /// Generate the pulse document a known discharge would produce
    Simulate {
        /// Source position as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        source: (f64, f64),

        /// Sensor as ID,LAT,LON (repeat for each sensor)
        #[arg(long = "sensor", value_parser = parse_sensor, required = true, allow_hyphen_values = true)]
        sensors: Vec<(String, f64, f64)>,

        /// Air temperature in degrees Celsius
        #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
        temperature: f64,

        /// Discharge time (RFC 3339), defaults to now
        #[arg(long, value_parser = parse_time)]
        time: Option<DateTime<Utc>>,

        /// Standard deviation of timing noise in seconds
        #[arg(long, default_value_t = 0.0)]
        noise: f64,

        /// Seed for reproducible noise
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn parse_lat_lon(value: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [lat, lon] => Ok((parse_degrees(lat)?, parse_degrees(lon)?)),
        _ => Err(format!("expected LAT,LON, got '{}'", value)),
    }
}

fn parse_sensor(value: &str) -> Result<(String, f64, f64), String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [id, lat, lon] if !id.is_empty() => Ok((id.to_string(), parse_degrees(lat)?, parse_degrees(lon)?)),
        _ => Err(format!("expected ID,LAT,LON, got '{}'", value)),
    }
}

fn parse_degrees(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|e| format!("invalid coordinate '{}': {}", value, e))
}

fn parse_pick(value: &str) -> Result<PulsePick, String> {
    let (path, sample) = value
        .rsplit_once('@')
        .ok_or_else(|| format!("expected PATH@SAMPLE, got '{}'", value))?;
    if path.is_empty() {
        return Err(format!("missing recording path in '{}'", value));
    }
    let sample = sample
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid sample index '{}': {}", sample, e))?;
    Ok(PulsePick::new(path, sample))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    parse_arrival_time(value).ok_or_else(|| format!("invalid timestamp '{}'", value))
}

fn process_logging(verbose: bool) -> LogConfig {
    let mut logging = LogConfig::default();
    if verbose {
        logging.level = LogLevel::Debug;
    }
    logging
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Locate {
            pulses,
            config,
            format,
            log_file,
            no_log_file,
            parallel,
            max_fit_error,
        } => {
            let mut config = match config {
                Some(path) => LocatorConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => LocatorConfig::default(),
            };

            if parallel {
                config = config.with_parallel(true);
            }
            if let Some(max_fit_error) = max_fit_error {
                config = config.with_max_fit_error(max_fit_error);
            }
            if no_log_file {
                config = config.with_log_file(None);
            } else if log_file.is_some() {
                config = config.with_log_file(log_file);
            }
            if cli.verbose {
                config.logging.level = LogLevel::Debug;
            }
            config.validate()?;

            init_logging(&config.logging);

            let batch = PulseParser::new()
                .parse_file(&pulses)
                .with_context(|| format!("reading pulses from {}", pulses.display()))?;

            let outcome = LocationPipeline::from_config(&config).locate(&batch)?;
            print!("{}", render(&outcome, format)?);
            if format == OutputFormat::Json {
                println!();
            }
        }

        Command::Pulses { picks, output } => {
            init_logging(&process_logging(cli.verbose));

            let batch = batch_from_picks(&picks)?;
            let json = PulseParser::new().to_json(&batch, true)?;
            match output {
                Some(path) => std::fs::write(&path, format!("{}\n", json))
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", json),
            }
        }

        Command::Inspect { recording } => {
            init_logging(&process_logging(cli.verbose));

            let recording = SensorRecording::from_file(&recording)
                .with_context(|| format!("reading recording {}", recording.display()))?;
            println!("sample rate: {} Hz", recording.sample_rate);
            println!("{}", serde_json::to_string_pretty(&recording.metadata)?);
        }

        Command::Simulate {
            source,
            sensors,
            temperature,
            time,
            noise,
            seed,
        } => {
            init_logging(&process_logging(cli.verbose));

            if noise < 0.0 {
                bail!("noise must not be negative, got {}", noise);
            }

            let scenario = sensors.into_iter().fold(
                SyntheticScenario::new(
                    GeodeticPosition::new(source.0, source.1, 0.0),
                    time.unwrap_or_else(Utc::now),
                )
                .with_temperature(temperature)
                .with_timing_noise(noise, seed),
                |scenario, (id, lat, lon)| scenario.with_sensor(id, GeodeticPosition::new(lat, lon, 0.0)),
            );

            let batch = scenario.generate(&UtmProjection::new())?;
            println!("{}", PulseParser::new().to_json(&batch, true)?);
        }
    }

    Ok(())
}
