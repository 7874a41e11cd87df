//! PHP↔JSON structural converters
//!
//! [`PhpToJson`] turns an extracted tree into the canonical ACF JSON shape.
//! [`JsonToPhp`] renders a canonical tree as PHP registration code. Both
//! start with the same input-shape check and report through
//! [`ConversionResult`].

mod json_to_php;
mod php_to_json;

pub use json_to_php::{quote_php_string, render_php_value, JsonToPhp};
pub use php_to_json::PhpToJson;

use serde_json::Value;

use crate::diagnostics::ConversionResult;

/// A conversion from one field-group representation to another
///
/// Implementations keep no per-call state, so `&self` is enough and one
/// converter can be shared across threads.
pub trait Converter {
    type Output;

    fn convert(&self, tree: &Value) -> ConversionResult<Self::Output>;
}
