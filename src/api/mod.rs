//! Location pipeline and result output
//!
//! [`LocationPipeline`] is the entry point for callers holding a batch of
//! pulses; the formatters turn its outcome into JSON, CSV or text.

pub mod formatting;
pub mod pipeline;

pub use formatting::{render, CsvFormatter, JsonFormatter, OutputFormat, TextFormatter};
pub use pipeline::LocationPipeline;
