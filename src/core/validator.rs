//! Cross-reference and consistency checks.
//!
//! Validation is exhaustive: every check runs and all errors are returned in
//! a fixed order, so one pass reports everything wrong with a document.
//! Order of checks:
//! 1. duplicate service / role names
//! 2. unknown role references
//! 3. group quantity >= 1
//! 4. well-formed ip ranges
//! 5. overlapping ip ranges between services
//! 6. range capacity for group + load balancer
//! 7. positive hardware sizing

use super::error::{EntityKind, ValidationError};
use super::types::*;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, warn};

/// A topology that passed validation.
///
/// Immutable and cheap to clone; the only input the expander accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    config: Arc<TopologyConfig>,
}

impl ValidatedConfig {
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }
}

impl Deref for ValidatedConfig {
    type Target = TopologyConfig;

    fn deref(&self) -> &TopologyConfig {
        &self.config
    }
}

/// Validate and seal a config. Returns every error found on failure.
pub fn validate(config: TopologyConfig) -> Result<ValidatedConfig, Vec<ValidationError>> {
    let errors = validate_config(&config);
    if !errors.is_empty() {
        debug!(errors = errors.len(), "topology rejected");
        return Err(errors);
    }
    for warning in lint_config(&config) {
        warn!("{}", warning);
    }
    debug!(services = config.services.len(), "topology validated");
    Ok(ValidatedConfig {
        config: Arc::new(config),
    })
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &TopologyConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    check_duplicates(config, &mut errors);
    check_role_refs(config, &mut errors);
    check_quantities(config, &mut errors);
    check_ranges(config, &mut errors);
    check_overlaps(config, &mut errors);
    check_capacity(config, &mut errors);
    check_hardware(config, &mut errors);
    errors
}

fn check_duplicates(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    report_duplicates(
        EntityKind::Service,
        config.services.iter().map(|s| s.name.as_str()),
        errors,
    );
    report_duplicates(
        EntityKind::Role,
        config.roles.iter().map(|r| r.name.as_str()),
        errors,
    );
}

/// One error per duplicated name, at its second occurrence.
fn report_duplicates<'a>(
    kind: EntityKind,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for name in names {
        if !seen.insert(name) && reported.insert(name) {
            errors.push(ValidationError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
}

fn check_role_refs(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    let known: HashSet<&str> = config.roles.iter().map(|r| r.name.as_str()).collect();
    for service in &config.services {
        for (field, role) in service.role_refs() {
            if !known.contains(role) {
                errors.push(ValidationError::UnknownRole {
                    service: service.name.clone(),
                    field,
                    role: role.to_string(),
                });
            }
        }
    }
}

fn check_quantities(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    for service in &config.services {
        let quantity = service.group().quantity;
        if quantity < 1 {
            errors.push(ValidationError::InvalidQuantity {
                service: service.name.clone(),
                quantity,
            });
        }
    }
}

fn check_ranges(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    for service in &config.services {
        if let Err(defect) = service.ip_range.bounds() {
            errors.push(ValidationError::InvalidRange {
                service: service.name.clone(),
                start: service.ip_range.start.clone(),
                end: service.ip_range.end.clone(),
                reason: defect.to_string(),
            });
        }
    }
}

/// Pairwise in document order; malformed ranges never overlap.
fn check_overlaps(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    for (i, first) in config.services.iter().enumerate() {
        for second in &config.services[i + 1..] {
            if first.ip_range.overlaps(&second.ip_range) {
                errors.push(ValidationError::OverlappingRange {
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
        }
    }
}

fn check_capacity(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    for service in &config.services {
        let quantity = service.group().quantity;
        let Some(available) = service.ip_range.capacity() else {
            continue;
        };
        if quantity < 1 {
            continue;
        }
        let required = quantity.unsigned_abs() + u64::from(service.lb.is_some());
        if required > available {
            errors.push(ValidationError::RangeExhausted {
                service: service.name.clone(),
                required,
                available,
            });
        }
    }
}

fn check_hardware(config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
    for role in &config.roles {
        for (field, value) in [("memory", role.hardware.memory), ("cpus", role.hardware.cpus)] {
            if value <= 0 {
                errors.push(ValidationError::InvalidHardware {
                    role: role.name.clone(),
                    field,
                    value,
                });
            }
        }
    }
}

// ============================================================================
// Lints
// ============================================================================

/// Non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Role has nothing to provision.
    NoProvisionSteps { role: String },
    /// Role is never referenced by a service.
    UnusedRole { role: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProvisionSteps { role } => {
                write!(f, "role '{}' has no provisioning steps", role)
            }
            Self::UnusedRole { role } => {
                write!(f, "role '{}' is not used by any service", role)
            }
        }
    }
}

/// Findings worth reporting that never fail validation.
pub fn lint_config(config: &TopologyConfig) -> Vec<Warning> {
    let used: HashSet<&str> = config
        .services
        .iter()
        .flat_map(|s| s.role_refs().map(|(_, role)| role))
        .collect();

    let mut warnings = Vec::new();
    for role in &config.roles {
        if role.provision.is_empty() {
            warnings.push(Warning::NoProvisionSteps {
                role: role.name.clone(),
            });
        }
        if !used.contains(role.name.as_str()) {
            warnings.push(Warning::UnusedRole {
                role: role.name.clone(),
            });
        }
    }
    warnings
}
