//! ACF Converter - Advanced Custom Fields field groups between PHP and JSON
//!
//! This library finds `acf_add_local_field_group(...)` calls in WordPress
//! theme code, evaluates their array literals without running PHP, and
//! converts the resulting trees to ACF JSON and back to PHP.

// Core modules
pub mod parser;
pub mod queries;
pub mod errors;
pub mod diagnostics;
pub mod keys;
pub mod evaluator;
pub mod extractor;
pub mod validator;
pub mod convert;

// Theme tooling around the core
pub mod config;
pub mod security;
pub mod cache_manager;
pub mod scanner;

// Re-export commonly used types
pub use config::{find_theme_root, ConverterSettings};
pub use convert::{Converter, JsonToPhp, PhpToJson};
pub use diagnostics::{ConversionResult, Diagnostics, Status, ValidationReport};
pub use evaluator::{evaluate, ArrayLiteralEvaluator};
pub use extractor::{ExtractOutcome, SourceExtractor};
pub use scanner::{ScanReport, ThemeScanner};
pub use validator::{validate_conversion, validate_field_group, FieldGroupValidator};
