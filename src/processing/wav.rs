//! Sensor recordings in RIFF/WAVE containers
//!
//! Each recording carries the sample rate in its `fmt ` chunk and a zlib
//! compressed JSON metadata chunk whose id starts with `smj`. The metadata
//! names the sensor, its position, the weather and the UTC time of the first
//! sample, so an analyst's pick of a sample index becomes a pulse.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use flate2::read::ZlibDecoder;
use serde::Deserialize;
use thiserror::Error;

use crate::core::{GeodeticPosition, Pulse};
use crate::processing::parser::{parse_arrival_time, PulseBatch, Weather};
use crate::processing::synthetic::pulse_id_for;

const METADATA_CHUNK_PREFIX: &[u8] = b"smj";
const FORMAT_CHUNK_ID: &[u8; 4] = b"fmt ";

/// Errors raised while reading a recording
#[derive(Debug, Error)]
pub enum WavError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a RIFF/WAVE container")]
    NotWave,

    #[error("chunk {chunk:?} declares {declared} bytes but only {available} remain")]
    Truncated {
        chunk: String,
        declared: usize,
        available: usize,
    },

    #[error("missing {0} chunk")]
    MissingChunk(&'static str),

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("metadata chunk does not inflate: {0}")]
    Inflate(#[source] std::io::Error),

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("unparseable recording start time {0:?}")]
    InvalidStartTime(String),

    #[error("sample {sample} at {sample_rate} Hz is outside the representable time range")]
    SampleOutOfRange { sample: u64, sample_rate: u32 },

    #[error("no recording carries weather metadata")]
    MissingWeather,
}

/// One chunk of a RIFF container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

/// Walk the chunks following the `RIFF....WAVE` header.
///
/// Odd-length chunks are followed by one pad byte.
pub fn read_chunks(bytes: &[u8]) -> Result<Vec<Chunk<'_>>, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWave);
    }

    let mut chunks = Vec::new();
    let mut rest = &bytes[12..];
    while rest.len() >= 8 {
        let mut id = [0u8; 4];
        id.copy_from_slice(&rest[..4]);
        let declared = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let body = &rest[8..];

        if body.len() < declared {
            return Err(WavError::Truncated {
                chunk: String::from_utf8_lossy(&id).into_owned(),
                declared,
                available: body.len(),
            });
        }

        chunks.push(Chunk {
            id,
            data: &body[..declared],
        });

        let padded = (declared + (declared & 1)).min(body.len());
        rest = &body[padded..];
    }

    Ok(chunks)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingMetadata {
    serial_number: String,
    #[serde(rename = "startTimeUTC")]
    start_time_utc: String,
    geolocation: MetadataLocation,
    #[serde(default)]
    weather: Option<MetadataWeather>,
}

#[derive(Debug, Deserialize)]
struct MetadataLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: f64,
}

#[derive(Debug, Deserialize)]
struct MetadataWeather {
    temperature: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    direction: Option<f64>,
}

/// Sensor metadata and timing of one recording
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecording {
    pub serial_number: String,
    pub sample_rate: u32,
    /// UTC time of sample zero
    pub start_time: DateTime<Utc>,
    pub location: GeodeticPosition,
    pub weather: Option<Weather>,
    /// The inflated metadata document as stored
    pub metadata: serde_json::Value,
}

impl SensorRecording {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WavError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| WavError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WavError> {
        let chunks = read_chunks(bytes)?;

        let format = chunks
            .iter()
            .find(|chunk| &chunk.id == FORMAT_CHUNK_ID)
            .ok_or(WavError::MissingChunk("fmt "))?;
        if format.data.len() < 8 {
            return Err(WavError::Truncated {
                chunk: "fmt ".to_string(),
                declared: 8,
                available: format.data.len(),
            });
        }
        let sample_rate = u32::from_le_bytes([format.data[4], format.data[5], format.data[6], format.data[7]]);
        if sample_rate == 0 {
            return Err(WavError::InvalidSampleRate(sample_rate));
        }

        let compressed = chunks
            .iter()
            .find(|chunk| chunk.id.starts_with(METADATA_CHUNK_PREFIX))
            .ok_or(WavError::MissingChunk("smj metadata"))?;

        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed.data)
            .read_to_end(&mut inflated)
            .map_err(WavError::Inflate)?;

        let metadata: serde_json::Value = serde_json::from_slice(&inflated)?;
        let fields: RecordingMetadata = serde_json::from_value(metadata.clone())?;

        let start_time = parse_arrival_time(&fields.start_time_utc)
            .ok_or_else(|| WavError::InvalidStartTime(fields.start_time_utc.clone()))?;

        tracing::debug!(
            sensor = %fields.serial_number,
            sample_rate,
            chunks = chunks.len(),
            "read recording metadata"
        );

        Ok(Self {
            serial_number: fields.serial_number,
            sample_rate,
            start_time,
            location: GeodeticPosition::new(
                fields.geolocation.latitude,
                fields.geolocation.longitude,
                fields.geolocation.elevation,
            ),
            weather: fields.weather.map(|w| Weather {
                temperature: w.temperature,
                windspeed: w.speed,
                winddir: w.direction,
            }),
            metadata,
        })
    }

    /// UTC time of `sample`, to the nanosecond
    pub fn arrival_time(&self, sample: u64) -> Result<DateTime<Utc>, WavError> {
        let out_of_range = || WavError::SampleOutOfRange {
            sample,
            sample_rate: self.sample_rate,
        };

        let nanos = u128::from(sample) * 1_000_000_000 / u128::from(self.sample_rate);
        let nanos = i64::try_from(nanos).map_err(|_| out_of_range())?;
        self.start_time
            .checked_add_signed(Duration::nanoseconds(nanos))
            .ok_or_else(out_of_range)
    }

    /// Pulse picked at `sample`; the id is derived from `source_name` and the
    /// arrival time so re-reading the same pick yields the same id
    pub fn pulse(&self, source_name: &str, sample: u64) -> Result<Pulse, WavError> {
        let arrival_time = self.arrival_time(sample)?;
        Ok(Pulse::new(
            pulse_id_for(source_name, arrival_time),
            self.serial_number.clone(),
            arrival_time,
            self.location,
        ))
    }
}

/// A sample index picked as the pulse onset in one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsePick {
    pub path: PathBuf,
    pub sample: u64,
}

impl PulsePick {
    pub fn new(path: impl Into<PathBuf>, sample: u64) -> Self {
        Self {
            path: path.into(),
            sample,
        }
    }
}

/// Build a pulse document from picks across recordings.
///
/// Weather is assumed uniform over the array; the last recording that
/// carries weather metadata supplies it.
pub fn batch_from_picks(picks: &[PulsePick]) -> Result<PulseBatch, WavError> {
    let mut pulses = Vec::with_capacity(picks.len());
    let mut weather = None;

    for pick in picks {
        let recording = SensorRecording::from_file(&pick.path)?;
        let name = pick
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| pick.path.display().to_string());

        pulses.push(recording.pulse(&name, pick.sample)?);
        if recording.weather.is_some() {
            weather = recording.weather;
        }
    }

    let weather = weather.ok_or(WavError::MissingWeather)?;
    Ok(PulseBatch::new(pulses, weather))
}
