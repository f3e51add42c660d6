//! Schema model for topology documents.
//!
//! Services compose roles: each service picks a topology (pool of independent
//! workers, or cluster of mutually aware nodes), an address range, and an
//! optional load balancer. Roles are reusable instance templates carrying
//! hardware sizing, a base image, a synced directory, and ordered provisioning
//! steps. Expansion output types live here too so the whole vocabulary is in
//! one place.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

// ============================================================================
// Top-level document
// ============================================================================

/// Root of a loaded topology document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyConfig {
    /// Services in document order
    pub services: Vec<Service>,

    /// Roles in document order
    pub roles: Vec<Role>,

    /// Unrecognized top-level sections, kept for re-serialization
    pub extensions: serde_yaml_ng::Mapping,
}

impl TopologyConfig {
    /// Look up a role by name (first match).
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Look up a service by name (first match).
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }
}

// ============================================================================
// Services
// ============================================================================

/// A discrete module of functionality backed by one group of instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    pub topology: Topology,
    pub ip_range: IpRange,
    pub lb: Option<LoadBalancer>,
}

impl Service {
    /// The instance group, regardless of topology.
    pub fn group(&self) -> &Group {
        self.topology.group()
    }

    /// Which group key this service uses.
    pub fn group_kind(&self) -> GroupKind {
        self.topology.group_kind()
    }

    /// Every role this service references, group first.
    pub fn role_refs(&self) -> impl Iterator<Item = (RoleRef, &str)> {
        std::iter::once((RoleRef::Group(self.group_kind()), self.group().role.as_str())).chain(
            self.lb
                .iter()
                .map(|lb| (RoleRef::LoadBalancer, lb.role.as_str())),
        )
    }
}

/// How a service's instances relate to each other.
///
/// The group lives inside the variant, so a pool can only carry `workers`
/// and a cluster can only carry `nodes`.
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    /// Independent workers; members never need to know about each other.
    Pool { workers: Group },
    /// Mutually aware nodes.
    Cluster { nodes: Group },
}

impl Topology {
    pub fn group(&self) -> &Group {
        match self {
            Self::Pool { workers } => workers,
            Self::Cluster { nodes } => nodes,
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        match self {
            Self::Pool { .. } => GroupKind::Workers,
            Self::Cluster { .. } => GroupKind::Nodes,
        }
    }

    /// Document tag (`pool` / `cluster`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Pool { .. } => "pool",
            Self::Cluster { .. } => "cluster",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Group key selected by the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Workers,
    Nodes,
}

impl GroupKind {
    /// Key used in the document (`workers` / `nodes`).
    pub fn key(self) -> &'static str {
        match self {
            Self::Workers => "workers",
            Self::Nodes => "nodes",
        }
    }

    /// Singular form used in instance names.
    pub fn member_label(self) -> &'static str {
        match self {
            Self::Workers => "worker",
            Self::Nodes => "node",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A pool or cluster group: how many instances of which role.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Requested instance count (signed so the validator can report `<= 0`)
    pub quantity: i64,
    pub role: String,
}

/// Singleton load balancer in front of the group.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancer {
    pub role: String,
}

/// Where a service references a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRef {
    Group(GroupKind),
    LoadBalancer,
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(kind) => write!(f, "{}.role", kind),
            Self::LoadBalancer => f.write_str("lb.role"),
        }
    }
}

/// Inclusive IPv4 address range, kept verbatim until validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub start: String,
    pub end: String,
}

/// Why an [`IpRange`] is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeDefect {
    BadStart,
    BadEnd,
    Reversed,
}

impl fmt::Display for RangeDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStart => f.write_str("start is not a valid IPv4 address"),
            Self::BadEnd => f.write_str("end is not a valid IPv4 address"),
            Self::Reversed => f.write_str("start is greater than end"),
        }
    }
}

impl IpRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Parse both ends and check ordering.
    pub fn bounds(&self) -> Result<(Ipv4Addr, Ipv4Addr), RangeDefect> {
        let start: Ipv4Addr = self
            .start
            .trim()
            .parse()
            .map_err(|_| RangeDefect::BadStart)?;
        let end: Ipv4Addr = self.end.trim().parse().map_err(|_| RangeDefect::BadEnd)?;
        if u32::from(start) > u32::from(end) {
            return Err(RangeDefect::Reversed);
        }
        Ok((start, end))
    }

    /// Numeric interval `[start, end]` if the range is well formed.
    pub fn interval(&self) -> Option<(u32, u32)> {
        self.bounds()
            .ok()
            .map(|(s, e)| (u32::from(s), u32::from(e)))
    }

    /// Number of addresses in the range (inclusive), if well formed.
    pub fn capacity(&self) -> Option<u64> {
        self.interval()
            .map(|(s, e)| u64::from(e) - u64::from(s) + 1)
    }

    /// Numeric interval intersection.
    pub fn overlaps(&self, other: &IpRange) -> bool {
        match (self.interval(), other.interval()) {
            (Some((a_start, a_end)), Some((b_start, b_end))) => {
                a_start <= b_end && b_start <= a_end
            }
            _ => false,
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Reusable instance template.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub hardware: Hardware,

    /// Base image identifier
    pub box_name: String,

    /// Where the base image is fetched from
    pub box_url: String,

    /// Host directory synced into the instance
    pub synced_dir: String,

    /// Provisioning steps, executed in order
    pub provision: Vec<ProvisionStep>,
}

/// Hardware sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hardware {
    /// Memory in MB
    pub memory: i64,
    pub cpus: i64,
}

/// One external script invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionStep {
    pub provisioner: Provisioner,

    /// Script path, relative to the project
    pub path: String,
}

impl ProvisionStep {
    pub fn shell(path: impl Into<String>) -> Self {
        Self {
            provisioner: Provisioner::Shell,
            path: path.into(),
        }
    }
}

/// Provisioner kind. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provisioner {
    Shell,
    Other(String),
}

impl Provisioner {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "shell" => Self::Shell,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Shell => "shell",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Expansion output
// ============================================================================

/// One concrete instance for the orchestrator to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Instance {
    /// Owning service
    pub service: String,

    /// Deterministic instance name
    pub name: String,

    /// Role template to instantiate
    pub role: String,

    /// Ordinal within its group (0 for the load balancer)
    pub index: u32,

    pub address: Ipv4Addr,

    /// Load balancer singleton rather than a group member
    pub is_lb: bool,
}

/// Expansion of a single service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServicePlan {
    pub service: String,
    pub topology: String,
    pub group: GroupKind,

    /// Load balancer first (if any), then members in ascending address order
    pub instances: Vec<Instance>,
}

impl ServicePlan {
    pub fn load_balancer(&self) -> Option<&Instance> {
        self.instances.iter().find(|i| i.is_lb)
    }

    pub fn members(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|i| !i.is_lb)
    }

    /// Member addresses; cluster nodes use these to find their peers.
    pub fn member_addresses(&self) -> Vec<Ipv4Addr> {
        self.members().map(|i| i.address).collect()
    }
}

/// Full expansion, one entry per service in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExpansionPlan {
    pub services: Vec<ServicePlan>,

    /// Summary counts
    pub total_instances: u32,
    pub load_balancers: u32,
    pub members: u32,
}

impl ExpansionPlan {
    /// All instances across services, in plan order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.services.iter().flat_map(|s| s.instances.iter())
    }

    pub fn service(&self, name: &str) -> Option<&ServicePlan> {
        self.services.iter().find(|s| s.service == name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_service() -> Service {
        Service {
            name: "api".to_string(),
            topology: Topology::Pool {
                workers: Group {
                    quantity: 2,
                    role: "api_worker".to_string(),
                },
            },
            ip_range: IpRange::new("10.0.0.0", "10.0.0.15"),
            lb: Some(LoadBalancer {
                role: "lb".to_string(),
            }),
        }
    }

    #[test]
    fn test_topology_group_kind() {
        let svc = pool_service();
        assert_eq!(svc.group_kind(), GroupKind::Workers);
        assert_eq!(svc.group().quantity, 2);
        assert_eq!(svc.topology.to_string(), "pool");

        let cluster = Topology::Cluster {
            nodes: Group {
                quantity: 5,
                role: "riak_node".to_string(),
            },
        };
        assert_eq!(cluster.group_kind(), GroupKind::Nodes);
        assert_eq!(cluster.tag(), "cluster");
    }

    #[test]
    fn test_role_refs_group_then_lb() {
        let svc = pool_service();
        let refs: Vec<_> = svc.role_refs().collect();
        assert_eq!(
            refs,
            vec![
                (RoleRef::Group(GroupKind::Workers), "api_worker"),
                (RoleRef::LoadBalancer, "lb"),
            ]
        );
        assert_eq!(refs[0].0.to_string(), "workers.role");
        assert_eq!(refs[1].0.to_string(), "lb.role");
    }

    #[test]
    fn test_ip_range_bounds() {
        let r = IpRange::new("192.168.0.0", "192.168.0.255");
        assert_eq!(r.capacity(), Some(256));
        assert_eq!(
            IpRange::new("192.168.0.300", "192.168.0.1").bounds(),
            Err(RangeDefect::BadStart)
        );
        assert_eq!(
            IpRange::new("192.168.0.1", "nope").bounds(),
            Err(RangeDefect::BadEnd)
        );
        assert_eq!(
            IpRange::new("192.168.0.9", "192.168.0.1").bounds(),
            Err(RangeDefect::Reversed)
        );
    }

    #[test]
    fn test_ip_range_single_address() {
        let r = IpRange::new("10.0.0.7", "10.0.0.7");
        assert_eq!(r.capacity(), Some(1));
    }

    #[test]
    fn test_ip_range_full_space_capacity() {
        let r = IpRange::new("0.0.0.0", "255.255.255.255");
        assert_eq!(r.capacity(), Some(1u64 << 32));
    }

    #[test]
    fn test_ip_range_overlap() {
        let a = IpRange::new("10.0.0.0", "10.0.0.255");
        let b = IpRange::new("10.0.0.255", "10.0.1.10");
        let c = IpRange::new("10.0.1.11", "10.0.1.20");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!b.overlaps(&c));
        assert!(!a.overlaps(&IpRange::new("bad", "10.0.0.1")));
    }

    #[test]
    fn test_provisioner_open_enum() {
        assert_eq!(Provisioner::from_tag("shell"), Provisioner::Shell);
        assert_eq!(
            Provisioner::from_tag("ansible"),
            Provisioner::Other("ansible".to_string())
        );
        assert_eq!(Provisioner::Other("puppet".into()).to_string(), "puppet");
        assert_eq!(ProvisionStep::shell("a.sh").provisioner.as_str(), "shell");
    }

    #[test]
    fn test_group_kind_labels() {
        assert_eq!(GroupKind::Workers.key(), "workers");
        assert_eq!(GroupKind::Nodes.member_label(), "node");
    }

    #[test]
    fn test_service_plan_accessors() {
        let inst = |name: &str, index, last, is_lb| Instance {
            service: "riak".to_string(),
            name: name.to_string(),
            role: "r".to_string(),
            index,
            address: Ipv4Addr::new(10, 0, 0, last),
            is_lb,
        };
        let plan = ServicePlan {
            service: "riak".to_string(),
            topology: "cluster".to_string(),
            group: GroupKind::Nodes,
            instances: vec![
                inst("riak-lb", 0, 0, true),
                inst("riak-node-0", 0, 1, false),
                inst("riak-node-1", 1, 2, false),
            ],
        };
        assert_eq!(plan.load_balancer().map(|i| i.name.as_str()), Some("riak-lb"));
        assert_eq!(
            plan.member_addresses(),
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn test_instance_serializes_address_as_string() {
        let inst = Instance {
            service: "s".to_string(),
            name: "s-lb".to_string(),
            role: "lb".to_string(),
            index: 0,
            address: Ipv4Addr::new(192, 168, 0, 0),
            is_lb: true,
        };
        let json = serde_json::to_string(&inst).unwrap();
        assert!(json.contains("\"address\":\"192.168.0.0\""));
        assert!(json.contains("\"is_lb\":true"));
    }
}
