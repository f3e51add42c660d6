//! Topology document loading.
//!
//! Turns YAML, JSON, or TOML text (or an already-parsed tree) into a
//! [`TopologyConfig`]. Structural problems abort the load with a
//! [`ParseError`] naming the dotted field path; cross-reference checks are
//! left to the validator.
//!
//! ```yaml
//! services:
//!   riak:
//!     topology: cluster
//!     ip_range: { start: 192.168.1.0, end: 192.168.1.255 }
//!     nodes: { quantity: 5, role: riak_node }
//!     lb: { role: lb }
//! roles:
//!   riak_node:
//!     hardware: { memory: 256, cpus: 4 }
//!     box: lucid64
//!     box_url: http://files.vagrantup.com/lucid64.box
//!     synced_dir: riak/
//!     provision:
//!       - { provisioner: shell, path: bootstrap/riak.sh }
//! ```

use super::error::{DocumentFormat, Location, ParseError};
use super::types::*;
use serde_yaml_ng::{Mapping, Value};
use std::path::Path;
use tracing::debug;

const SERVICES: &str = "services";
const ROLES: &str = "roles";

const SERVICE_KEYS: &[&str] = &["name", "topology", "ip_range", "workers", "nodes", "lb"];
const ROLE_KEYS: &[&str] = &[
    "name",
    "hardware",
    "box",
    "box_url",
    "synced_dir",
    "provision",
];
const RANGE_KEYS: &[&str] = &["start", "end"];
const GROUP_KEYS: &[&str] = &["quantity", "role"];
const LB_KEYS: &[&str] = &["role"];
const HARDWARE_KEYS: &[&str] = &["memory", "cpus"];
const STEP_KEYS: &[&str] = &["provisioner", "path"];

/// Loader behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Reject unknown top-level sections and unknown entity keys instead of
    /// passing them through.
    pub strict: bool,
}

impl LoadOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Parse a topology file from disk, inferring the format from its extension.
pub fn parse_config_file(path: &Path) -> Result<TopologyConfig, ParseError> {
    parse_config_file_with(path, LoadOptions::default())
}

/// Parse a topology file from disk with explicit options.
pub fn parse_config_file_with(
    path: &Path,
    options: LoadOptions,
) -> Result<TopologyConfig, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loading topology");
    parse_document(&content, DocumentFormat::from_path(path), options)
}

/// Parse a YAML topology document with default options.
pub fn parse_config(yaml: &str) -> Result<TopologyConfig, ParseError> {
    parse_document(yaml, DocumentFormat::Yaml, LoadOptions::default())
}

/// Parse a topology document in the given format.
pub fn parse_document(
    text: &str,
    format: DocumentFormat,
    options: LoadOptions,
) -> Result<TopologyConfig, ParseError> {
    let tree = read_tree(text, format)?;
    parse_value(&tree, options)
}

/// Decode text into a generic tree without interpreting it.
fn read_tree(text: &str, format: DocumentFormat) -> Result<Value, ParseError> {
    match format {
        DocumentFormat::Yaml => serde_yaml_ng::from_str(text).map_err(|e| ParseError::Syntax {
            format,
            location: e.location().map(|l| Location {
                line: l.line(),
                column: l.column(),
            }),
            message: e.to_string(),
        }),
        DocumentFormat::Json => {
            let json: serde_json::Value =
                serde_json::from_str(text).map_err(|e| ParseError::Syntax {
                    format,
                    location: Some(Location {
                        line: e.line(),
                        column: e.column(),
                    }),
                    message: e.to_string(),
                })?;
            convert_tree(&json, format)
        }
        DocumentFormat::Toml => {
            let table: toml::Table = toml::from_str(text).map_err(|e| ParseError::Syntax {
                format,
                location: None,
                message: e.message().to_string(),
            })?;
            convert_tree(&table, format)
        }
    }
}

fn convert_tree<T: serde::Serialize>(tree: &T, format: DocumentFormat) -> Result<Value, ParseError> {
    serde_yaml_ng::to_value(tree).map_err(|e| ParseError::Syntax {
        format,
        location: None,
        message: e.to_string(),
    })
}

/// Build the schema model from an already-parsed tree.
pub fn parse_value(root: &Value, options: LoadOptions) -> Result<TopologyConfig, ParseError> {
    let root = untag(root);
    let top = match root {
        Value::Mapping(m) => m,
        Value::Null => return Err(ParseError::MissingSection(SERVICES)),
        other => {
            return Err(ParseError::malformed(
                "<root>",
                format!("expected a mapping, found {}", kind_of(other)),
            ))
        }
    };

    let services_node = top
        .get(SERVICES)
        .ok_or(ParseError::MissingSection(SERVICES))?;
    let roles_node = top.get(ROLES).ok_or(ParseError::MissingSection(ROLES))?;

    let mut extensions = Mapping::new();
    for (key, value) in top {
        if matches!(untag(key), Value::String(s) if s == SERVICES || s == ROLES) {
            continue;
        }
        if options.strict {
            return Err(ParseError::UnknownSection(key_label(key)));
        }
        debug!(section = %key_label(key), "passing through unknown section");
        extensions.insert(key.clone(), value.clone());
    }

    let services = entries(services_node, SERVICES)?
        .into_iter()
        .map(|(name, path, node)| parse_service(name, &path, node, options))
        .collect::<Result<Vec<_>, _>>()?;
    let roles = entries(roles_node, ROLES)?
        .into_iter()
        .map(|(name, path, node)| parse_role(name, &path, node, options))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        services = services.len(),
        roles = roles.len(),
        "parsed topology"
    );

    Ok(TopologyConfig {
        services,
        roles,
        extensions,
    })
}

/// Named entries of a section: either `{name: {...}}` or `[{name: .., ...}]`.
/// Yields `(name, field path, body)` in document order.
fn entries<'a>(node: &'a Value, section: &str) -> Result<Vec<(String, String, &'a Mapping)>, ParseError> {
    match untag(node) {
        Value::Null => Ok(Vec::new()),
        Value::Mapping(map) => map
            .iter()
            .map(|(key, body)| {
                let name = key_str(key, section)?.to_string();
                let path = format!("{}.{}", section, name);
                let body = as_mapping(body, &path)?;
                Ok((name, path, body))
            })
            .collect(),
        Value::Sequence(seq) => seq
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let path = format!("{}[{}]", section, i);
                let body = as_mapping(item, &path)?;
                let name = required_str(body, "name", &path)?;
                let path = format!("{}.{}", section, name);
                Ok((name, path, body))
            })
            .collect(),
        other => Err(ParseError::malformed(
            section,
            format!("expected a mapping or sequence, found {}", kind_of(other)),
        )),
    }
}

fn parse_service(
    name: String,
    path: &str,
    body: &Mapping,
    options: LoadOptions,
) -> Result<Service, ParseError> {
    check_keys(body, SERVICE_KEYS, path, options)?;

    let tag = required_str(body, "topology", path)?;
    let (expected, other) = match tag.as_str() {
        "pool" => (GroupKind::Workers, GroupKind::Nodes),
        "cluster" => (GroupKind::Nodes, GroupKind::Workers),
        unknown => {
            return Err(ParseError::malformed(
                format!("{}.topology", path),
                format!("unknown topology '{}' (expected 'pool' or 'cluster')", unknown),
            ))
        }
    };

    if body.get(expected.key()).is_none() && body.get(other.key()).is_some() {
        return Err(ParseError::malformed(
            format!("{}.{}", path, other.key()),
            format!(
                "{} services declare '{}', found '{}'",
                tag,
                expected.key(),
                other.key()
            ),
        ));
    }
    let group_path = format!("{}.{}", path, expected.key());
    let group = parse_group(
        required_mapping(body, expected.key(), path)?,
        &group_path,
        options,
    )?;
    let topology = match expected {
        GroupKind::Workers => Topology::Pool { workers: group },
        GroupKind::Nodes => Topology::Cluster { nodes: group },
    };

    let range_path = format!("{}.ip_range", path);
    let range = required_mapping(body, "ip_range", path)?;
    check_keys(range, RANGE_KEYS, &range_path, options)?;
    let ip_range = IpRange {
        start: required_str(range, "start", &range_path)?,
        end: required_str(range, "end", &range_path)?,
    };

    let lb = match body.get("lb").map(untag) {
        None | Some(Value::Null) => None,
        Some(_) => {
            let lb_path = format!("{}.lb", path);
            let lb = required_mapping(body, "lb", path)?;
            check_keys(lb, LB_KEYS, &lb_path, options)?;
            Some(LoadBalancer {
                role: required_str(lb, "role", &lb_path)?,
            })
        }
    };

    Ok(Service {
        name,
        topology,
        ip_range,
        lb,
    })
}

fn parse_group(body: &Mapping, path: &str, options: LoadOptions) -> Result<Group, ParseError> {
    check_keys(body, GROUP_KEYS, path, options)?;
    Ok(Group {
        quantity: required_number(body, "quantity", path)?,
        role: required_str(body, "role", path)?,
    })
}

fn parse_role(
    name: String,
    path: &str,
    body: &Mapping,
    options: LoadOptions,
) -> Result<Role, ParseError> {
    check_keys(body, ROLE_KEYS, path, options)?;

    let hw_path = format!("{}.hardware", path);
    let hw = required_mapping(body, "hardware", path)?;
    check_keys(hw, HARDWARE_KEYS, &hw_path, options)?;
    let hardware = Hardware {
        memory: required_number(hw, "memory", &hw_path)?,
        cpus: required_number(hw, "cpus", &hw_path)?,
    };

    Ok(Role {
        name,
        hardware,
        box_name: required_str(body, "box", path)?,
        box_url: required_str(body, "box_url", path)?,
        synced_dir: required_str(body, "synced_dir", path)?,
        provision: parse_provision(
            body.get("provision"),
            &format!("{}.provision", path),
            options,
        )?,
    })
}

/// Provisioning steps must be an ordered sequence; set-like mappings are
/// rejected because step order matters.
fn parse_provision(
    node: Option<&Value>,
    path: &str,
    options: LoadOptions,
) -> Result<Vec<ProvisionStep>, ParseError> {
    let seq = match node.map(untag) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(seq)) => seq,
        Some(other) => {
            return Err(ParseError::malformed(
                path,
                format!("expected an ordered sequence of steps, found {}", kind_of(other)),
            ))
        }
    };

    seq.iter()
        .enumerate()
        .map(|(i, item)| {
            let step_path = format!("{}[{}]", path, i);
            let step = as_mapping(item, &step_path)?;
            check_keys(step, STEP_KEYS, &step_path, options)?;
            let provisioner = Provisioner::from_tag(&required_str(step, "provisioner", &step_path)?);
            let script = required_str(step, "path", &step_path)?;
            if script.trim().is_empty() {
                return Err(ParseError::malformed(
                    format!("{}.path", step_path),
                    "script path must not be empty",
                ));
            }
            Ok(ProvisionStep {
                provisioner,
                path: script,
            })
        })
        .collect()
}

// ============================================================================
// Tree helpers
// ============================================================================

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn key_str<'a>(key: &'a Value, path: &str) -> Result<&'a str, ParseError> {
    match untag(key) {
        Value::String(s) => Ok(s),
        other => Err(ParseError::malformed(
            path,
            format!("keys must be strings, found {}", kind_of(other)),
        )),
    }
}

/// Human-readable form of a mapping key, for diagnostics.
fn key_label(key: &Value) -> String {
    match untag(key) {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => kind_of(other).to_string(),
    }
}

fn as_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a Mapping, ParseError> {
    match untag(value) {
        Value::Mapping(m) => Ok(m),
        other => Err(ParseError::malformed(
            path,
            format!("expected a mapping, found {}", kind_of(other)),
        )),
    }
}

fn required<'a>(body: &'a Mapping, key: &str, path: &str) -> Result<&'a Value, ParseError> {
    body.get(key)
        .map(untag)
        .ok_or_else(|| ParseError::malformed(format!("{}.{}", path, key), "missing required field"))
}

fn required_mapping<'a>(body: &'a Mapping, key: &str, path: &str) -> Result<&'a Mapping, ParseError> {
    as_mapping(required(body, key, path)?, &format!("{}.{}", path, key))
}

fn required_str(body: &Mapping, key: &str, path: &str) -> Result<String, ParseError> {
    match required(body, key, path)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(ParseError::malformed(
            format!("{}.{}", path, key),
            format!("expected a string, found {}", kind_of(other)),
        )),
    }
}

/// Integers may be written natively or as numeric strings.
fn required_number(body: &Mapping, key: &str, path: &str) -> Result<i64, ParseError> {
    let field = format!("{}.{}", path, key);
    let invalid = |value: String| ParseError::InvalidNumber {
        field: field.clone(),
        value,
    };
    match required(body, key, path)? {
        Value::Number(n) => n.as_i64().ok_or_else(|| invalid(n.to_string())),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid(s.clone())),
        Value::Bool(b) => Err(invalid(b.to_string())),
        other => Err(invalid(kind_of(other).to_string())),
    }
}

fn check_keys(
    body: &Mapping,
    allowed: &[&str],
    path: &str,
    options: LoadOptions,
) -> Result<(), ParseError> {
    if !options.strict {
        return Ok(());
    }
    for (key, _) in body {
        let key = key_str(key, path)?;
        if !allowed.contains(&key) {
            return Err(ParseError::malformed(
                format!("{}.{}", path, key),
                "unknown key",
            ));
        }
    }
    Ok(())
}
