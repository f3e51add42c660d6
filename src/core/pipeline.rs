//! Load → validate in one call, for callers that only want a usable snapshot.

use super::error::{DocumentFormat, Error};
use super::parser::{self, LoadOptions};
use super::types::TopologyConfig;
use super::validator::{self, ValidatedConfig};
use std::path::Path;
use tracing::error;

/// Parse and validate a topology file.
pub fn load_file(path: &Path) -> Result<ValidatedConfig, Error> {
    let config = parser::parse_config_file(path)?;
    seal(config)
}

/// Parse and validate a YAML topology document held in memory.
pub fn load_str(yaml: &str) -> Result<ValidatedConfig, Error> {
    load_document(yaml, DocumentFormat::Yaml, LoadOptions::default())
}

/// Parse and validate a topology document in the given format.
pub fn load_document(
    text: &str,
    format: DocumentFormat,
    options: LoadOptions,
) -> Result<ValidatedConfig, Error> {
    let config = parser::parse_document(text, format, options)?;
    seal(config)
}

fn seal(config: TopologyConfig) -> Result<ValidatedConfig, Error> {
    validator::validate(config).map_err(|errors| {
        for e in &errors {
            error!("{}", e);
        }
        Error::Invalid(errors)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ParseError, ValidationError};
    use crate::core::expander::expand;

    const SYSTEM: &str = include_str!("../../testdata/system.yaml");

    #[test]
    fn test_load_str_then_expand() {
        let valid = load_str(SYSTEM).unwrap();
        let plan = expand(&valid).unwrap();
        assert_eq!(plan.total_instances, 9);
    }

    #[test]
    fn test_load_document_strict_json() {
        let json = r#"{"services": {}, "roles": {}, "owner": "ops"}"#;
        assert!(load_document(json, DocumentFormat::Json, LoadOptions::default()).is_ok());
        let err = load_document(json, DocumentFormat::Json, LoadOptions::strict()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::UnknownSection(ref s)) if s == "owner"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.yml");
        std::fs::write(&path, SYSTEM).unwrap();
        let valid = load_file(&path).unwrap();
        assert_eq!(valid.roles.len(), 3);
    }

    #[test]
    fn test_load_reports_parse_error() {
        let err = load_str("roles: {}").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.to_string(), "missing required section 'services'");
    }

    #[test]
    fn test_load_reports_all_validation_errors() {
        let broken = SYSTEM
            .replace("role: riak_node", "role: nonexistent_role")
            .replace("192.168.1.0", "192.168.0.128");
        let err = load_str(&broken).unwrap_err();
        let errors = match err {
            Error::Invalid(errors) => errors,
            other => panic!("expected validation failure, got {other}"),
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ValidationError::UnknownRole { service, role, .. }
            if service == "riak" && role == "nonexistent_role"));
        assert!(matches!(&errors[1], ValidationError::OverlappingRange { first, second }
            if first == "analytics_api" && second == "riak"));
    }
}
