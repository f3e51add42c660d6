//! Document emission — the inverse of the loader.
//!
//! Sections are emitted as mappings keyed by name. A section containing a
//! duplicate name falls back to the sequence form so nothing is lost.

use super::types::*;
use serde_yaml_ng::{Mapping, Value};
use std::collections::HashSet;

/// Build the document tree for a config.
pub fn to_document(config: &TopologyConfig) -> Value {
    let mut root = Mapping::new();
    root.insert(
        string("services"),
        section(config.services.iter().map(|s| (s.name.as_str(), service_body(s)))),
    );
    root.insert(
        string("roles"),
        section(config.roles.iter().map(|r| (r.name.as_str(), role_body(r)))),
    );
    for (key, value) in &config.extensions {
        root.insert(key.clone(), value.clone());
    }
    Value::Mapping(root)
}

/// Serialize a config to YAML text.
pub fn to_yaml(config: &TopologyConfig) -> Result<String, serde_yaml_ng::Error> {
    serde_yaml_ng::to_string(&to_document(config))
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

fn number(n: i64) -> Value {
    Value::Number(n.into())
}

fn mapping<const N: usize>(pairs: [(&str, Value); N]) -> Mapping {
    let mut m = Mapping::new();
    for (k, v) in pairs {
        m.insert(string(k), v);
    }
    m
}

fn section<'a>(entries: impl Iterator<Item = (&'a str, Mapping)>) -> Value {
    let entries: Vec<_> = entries.collect();
    let mut seen = HashSet::new();
    let unique = entries.iter().all(|(name, _)| seen.insert(*name));

    if unique {
        let mut m = Mapping::new();
        for (name, body) in entries {
            m.insert(string(name), Value::Mapping(body));
        }
        Value::Mapping(m)
    } else {
        Value::Sequence(
            entries
                .into_iter()
                .map(|(name, body)| {
                    let mut m = mapping([("name", string(name))]);
                    m.extend(body);
                    Value::Mapping(m)
                })
                .collect(),
        )
    }
}

fn service_body(service: &Service) -> Mapping {
    let group = service.group();
    let mut m = mapping([
        ("topology", string(service.topology.tag())),
        (
            "ip_range",
            Value::Mapping(mapping([
                ("start", string(&service.ip_range.start)),
                ("end", string(&service.ip_range.end)),
            ])),
        ),
        (
            service.group_kind().key(),
            Value::Mapping(mapping([
                ("quantity", number(group.quantity)),
                ("role", string(&group.role)),
            ])),
        ),
    ]);
    if let Some(lb) = &service.lb {
        m.insert(string("lb"), Value::Mapping(mapping([("role", string(&lb.role))])));
    }
    m
}

fn role_body(role: &Role) -> Mapping {
    let steps = role
        .provision
        .iter()
        .map(|step| {
            Value::Mapping(mapping([
                ("provisioner", string(step.provisioner.as_str())),
                ("path", string(&step.path)),
            ]))
        })
        .collect();
    mapping([
        (
            "hardware",
            Value::Mapping(mapping([
                ("memory", number(role.hardware.memory)),
                ("cpus", number(role.hardware.cpus)),
            ])),
        ),
        ("box", string(&role.box_name)),
        ("box_url", string(&role.box_url)),
        ("synced_dir", string(&role.synced_dir)),
        ("provision", Value::Sequence(steps)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{parse_config, parse_value, LoadOptions};

    const SYSTEM: &str = include_str!("../../testdata/system.yaml");

    #[test]
    fn test_roundtrip_reference_topology() {
        let config = parse_config(SYSTEM).unwrap();
        let yaml = to_yaml(&config).unwrap();
        let again = parse_config(&yaml).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_roundtrip_via_tree() {
        let config = parse_config(SYSTEM).unwrap();
        let again = parse_value(&to_document(&config), LoadOptions::strict()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_document_shape() {
        let config = parse_config(SYSTEM).unwrap();
        let doc = to_document(&config);
        let riak = &doc["services"]["riak"];
        assert_eq!(riak["topology"].as_str(), Some("cluster"));
        assert_eq!(riak["nodes"]["quantity"].as_i64(), Some(5));
        assert!(riak.get("workers").is_none());
        assert_eq!(doc["roles"]["lb"]["box"].as_str(), Some("lucid64"));
        assert_eq!(
            doc["roles"]["lb"]["provision"][5]["path"].as_str(),
            Some("bootstrap/haproxy.sh")
        );
    }

    #[test]
    fn test_extensions_survive_roundtrip() {
        let config = parse_config("services: {}\nroles: {}\nowner: ops-team\n").unwrap();
        let again = parse_config(&to_yaml(&config).unwrap()).unwrap();
        assert_eq!(again.extensions, config.extensions);
    }

    #[test]
    fn test_non_string_extension_keys_survive_roundtrip() {
        let config = parse_config("services: {}\nroles: {}\n1: x\ntrue: [a, b]\n").unwrap();
        assert_eq!(config.extensions.len(), 2);
        let again = parse_config(&to_yaml(&config).unwrap()).unwrap();
        assert_eq!(again.extensions, config.extensions);
    }

    #[test]
    fn test_duplicates_emit_sequence_form() {
        let mut config = parse_config(SYSTEM).unwrap();
        let copy = config.roles[0].clone();
        config.roles.push(copy);
        let doc = to_document(&config);
        assert!(doc["roles"].is_sequence());
        assert!(doc["services"].is_mapping());
        let again = parse_value(&doc, LoadOptions::default()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_service_without_lb_omits_key() {
        let mut config = parse_config(SYSTEM).unwrap();
        config.services[0].lb = None;
        let doc = to_document(&config);
        assert!(doc["services"]["analytics_api"].get("lb").is_none());
    }
}
