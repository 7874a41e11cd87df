//! Result vocabulary shared by the converters, the validator and the extractor
//!
//! Every public entry point returns its diagnostics as a value. Nothing is
//! kept on the converter instances, so one instance can serve many files
//! (and many threads) at once.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Outcome of a conversion or validation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing to report
    Success,
    /// Usable result, but the caller should show the warnings
    Warning,
    /// No usable result
    Error,
}

/// Accumulated errors and warnings for a single call
///
/// Recording an entry also logs it, so every problem reaches the log sink
/// without callers having to remember to do it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(message);
    }

    /// Record a warning
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// error > warning > success
    pub fn status(&self) -> Status {
        if self.has_errors() {
            Status::Error
        } else if self.has_warnings() {
            Status::Warning
        } else {
            Status::Success
        }
    }
}

/// Result of a PHP→JSON or JSON→PHP conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl<T> ConversionResult<T> {
    /// Build a result from produced data; the status follows the diagnostics
    pub fn from_data(data: T, diagnostics: Diagnostics) -> Self {
        let status = diagnostics.status();
        let data = if status == Status::Error { None } else { Some(data) };
        Self {
            status,
            data,
            warnings: diagnostics.warnings,
            errors: diagnostics.errors,
        }
    }

    /// Build an error result with no output
    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            status: Status::Error,
            data: None,
            warnings: diagnostics.warnings,
            errors: diagnostics.errors,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

/// Result of a structural or round-trip validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<Diagnostics> for ValidationReport {
    fn from(diagnostics: Diagnostics) -> Self {
        let status = diagnostics.status();
        Self {
            valid: status != Status::Error,
            status,
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
        }
    }
}
