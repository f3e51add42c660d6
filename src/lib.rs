//! Topoplan — typed topology documents for VM orchestrators.
//!
//! Loads service/role topologies, validates every cross-reference in one
//! pass, and expands pools and clusters into addressed instances.

pub mod core;

pub use crate::core::error::{DocumentFormat, Error, ExpandError, ParseError, ValidationError};
pub use crate::core::expander::expand;
pub use crate::core::parser::LoadOptions;
pub use crate::core::pipeline::{load_document, load_file, load_str};
pub use crate::core::validator::{validate, ValidatedConfig};
