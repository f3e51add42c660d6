//! Core topology logic — types, loading, validation, expansion, emission.

pub mod emitter;
pub mod error;
pub mod expander;
pub mod fingerprint;
pub mod parser;
pub mod pipeline;
pub mod types;
pub mod validator;
