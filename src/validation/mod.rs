//! Error taxonomy, diagnostics and input validation

pub mod data;
pub mod diagnostics;
pub mod error;

pub use data::{PulseValidator, ValidationConfig, ValidationError};
pub use diagnostics::{DiagnosticSink, FileSink, MemorySink, TeeSink, TracingSink};
pub use error::{Diagnostic, DiagnosticKind, LocationError, Severity, SolveError};
