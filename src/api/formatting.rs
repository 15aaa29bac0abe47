//! Result formatting for export and display

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{LocationOutcome, LocationResult};
use crate::processing::parser::format_arrival_time;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format '{}', expected json, text or csv", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Render an outcome in the requested format
pub fn render(outcome: &LocationOutcome, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => JsonFormatter::pretty().format_json(outcome.results()),
        OutputFormat::Text => Ok(TextFormatter::new().format_text(outcome)),
        OutputFormat::Csv => Ok(CsvFormatter::new().format_csv(outcome.results())),
    }
}

/// Human-readable text formatter
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    /// One line per result
    pub compact: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compact() -> Self {
        Self { compact: true }
    }

    pub fn format_text(&self, outcome: &LocationOutcome) -> String {
        let results = match outcome {
            LocationOutcome::Located(results) => results,
            LocationOutcome::InsufficientData { available, required } => {
                return format!("No location: {} usable pulses, {} required\n", available, required);
            }
            LocationOutcome::NoViableLocation => return "No viable location\n".to_string(),
        };

        let mut output = String::new();
        for (rank, result) in results.iter().enumerate() {
            if self.compact {
                output.push_str(&format!(
                    "#{} {:.6}, {:.6} at {} | err {:.3} m^2 | {} | ref {}\n",
                    rank + 1,
                    result.position.latitude,
                    result.position.longitude,
                    format_arrival_time(result.discharge_time),
                    result.fit_error,
                    result.variant,
                    result.reference_sensor_id
                ));
                continue;
            }

            output.push_str(&format!("Result #{}:\n", rank + 1));
            output.push_str(&format!("  Latitude:   {:.6}°\n", result.position.latitude));
            output.push_str(&format!("  Longitude:  {:.6}°\n", result.position.longitude));
            output.push_str(&format!("  Discharge:  {}\n", format_arrival_time(result.discharge_time)));
            output.push_str(&format!("  Fit error:  {:.3} m^2\n", result.fit_error));
            output.push_str(&format!("  Algorithm:  {}\n", result.variant));
            output.push_str(&format!("  Reference:  {}\n", result.reference_sensor_id));
        }
        output
    }
}

/// JSON formatter producing the export record list
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, results: &[LocationResult]) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(results)
        } else {
            serde_json::to_string(results)
        }
    }
}

/// CSV formatter, one row per result
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> String {
        "rank,latitude,longitude,elevation,discharge_time,self_consistent_error,algorithm,reference_sensor".to_string()
    }

    pub fn format_row(&self, rank: usize, result: &LocationResult) -> String {
        format!(
            "{},{:.8},{:.8},{:.1},{},{:.6},{},{}",
            rank,
            result.position.latitude,
            result.position.longitude,
            result.position.elevation,
            format_arrival_time(result.discharge_time),
            result.fit_error,
            result.variant,
            escape_field(&result.reference_sensor_id)
        )
    }

    pub fn format_csv(&self, results: &[LocationResult]) -> String {
        let mut output = String::new();
        if self.include_header {
            output.push_str(&self.header());
            output.push('\n');
        }
        for (rank, result) in results.iter().enumerate() {
            output.push_str(&self.format_row(rank + 1, result));
            output.push('\n');
        }
        output
    }
}

fn escape_field(value: &str) -> String {
    if value.contains(|c| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
