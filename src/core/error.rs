//! Error taxonomy: load failures abort immediately, validation failures are
//! collected, expansion failures are invariant violations.

use super::types::RoleRef;
use std::fmt;
use std::path::PathBuf;

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Infer from a file extension; anything unrecognized is YAML.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "YAML"),
            Self::Json => write!(f, "JSON"),
            Self::Toml => write!(f, "TOML"),
        }
    }
}

/// Line/column of a syntax error, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " at line {} column {}", self.line, self.column)
    }
}

fn at(location: &Option<Location>) -> String {
    location.map(|l| l.to_string()).unwrap_or_default()
}

/// Malformed input. Loading stops at the first one.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{format} syntax error{}: {message}", at(.location))]
    Syntax {
        format: DocumentFormat,
        message: String,
        location: Option<Location>,
    },

    #[error("missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("{field}: invalid number '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("{field}: {message}")]
    Malformed { field: String, message: String },

    #[error("unknown top-level section '{0}'")]
    UnknownSection(String),
}

impl ParseError {
    pub(crate) fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted path of the offending field, where one applies.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidNumber { field, .. } | Self::Malformed { field, .. } => Some(field),
            Self::MissingSection(name) => Some(name),
            Self::UnknownSection(name) => Some(name),
            Self::Io { .. } | Self::Syntax { .. } => None,
        }
    }
}

/// Which namespace a duplicate name was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Service,
    Role,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Role => write!(f, "role"),
        }
    }
}

/// A cross-reference or consistency problem. Validation collects all of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: EntityKind, name: String },

    #[error("service '{service}' {field} references unknown role '{role}'")]
    UnknownRole {
        service: String,
        field: RoleRef,
        role: String,
    },

    #[error("service '{service}' has invalid quantity {quantity} (must be >= 1)")]
    InvalidQuantity { service: String, quantity: i64 },

    #[error("service '{service}' has invalid ip_range {start}-{end}: {reason}")]
    InvalidRange {
        service: String,
        start: String,
        end: String,
        reason: String,
    },

    #[error("ip_range of service '{first}' overlaps ip_range of service '{second}'")]
    OverlappingRange { first: String, second: String },

    #[error("service '{service}' needs {required} addresses but its ip_range holds {available}")]
    RangeExhausted {
        service: String,
        required: u64,
        available: u64,
    },

    #[error("role '{role}' has invalid hardware.{field} {value} (must be > 0)")]
    InvalidHardware {
        role: String,
        field: &'static str,
        value: i64,
    },
}

/// Expansion ran on a model that should never have passed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("service '{service}': address for instance {index} lies beyond the end of its ip_range")]
    AddressOverflow { service: String, index: u32 },

    #[error("service '{service}': ip_range is not usable")]
    InvalidRange { service: String },
}

/// Any failure of the load → validate → expand pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Expand(#[from] ExpandError),
}
