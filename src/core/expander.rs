//! Instance expansion — turn each validated service into concrete instances.
//!
//! Per service: the load balancer (if any) takes `range.start`, then group
//! members follow at ascending addresses. Without a load balancer the first
//! member takes `range.start`.

use super::error::ExpandError;
use super::types::*;
use super::validator::ValidatedConfig;
use std::net::Ipv4Addr;
use tracing::debug;

/// Expand every service in document order.
pub fn expand(config: &ValidatedConfig) -> Result<ExpansionPlan, ExpandError> {
    let mut services = Vec::with_capacity(config.services.len());
    let mut load_balancers = 0u32;
    let mut members = 0u32;

    for service in &config.services {
        let plan = expand_service(service)?;
        for instance in &plan.instances {
            if instance.is_lb {
                load_balancers += 1;
            } else {
                members += 1;
            }
        }
        services.push(plan);
    }

    debug!(
        services = services.len(),
        load_balancers, members, "expanded topology"
    );

    Ok(ExpansionPlan {
        services,
        total_instances: load_balancers + members,
        load_balancers,
        members,
    })
}

/// Expand a single service. Expects a service from a validated config.
pub fn expand_service(service: &Service) -> Result<ServicePlan, ExpandError> {
    let (start, end) = service
        .ip_range
        .bounds()
        .map_err(|_| ExpandError::InvalidRange {
            service: service.name.clone(),
        })?;
    let (start, end) = (u32::from(start), u32::from(end));
    let group = service.group();
    let kind = service.group_kind();

    let count = u32::try_from(group.quantity).map_err(|_| ExpandError::AddressOverflow {
        service: service.name.clone(),
        index: 0,
    })?;
    let mut instances = Vec::with_capacity(count as usize + 1);

    let first_member = match &service.lb {
        Some(lb) => {
            instances.push(Instance {
                service: service.name.clone(),
                name: format!("{}-lb", service.name),
                role: lb.role.clone(),
                index: 0,
                address: Ipv4Addr::from(start),
                is_lb: true,
            });
            1u64
        }
        None => 0u64,
    };

    for index in 0..count {
        let address = u64::from(start) + first_member + u64::from(index);
        let address = u32::try_from(address)
            .ok()
            .filter(|a| *a <= end)
            .ok_or_else(|| ExpandError::AddressOverflow {
                service: service.name.clone(),
                index,
            })?;
        instances.push(Instance {
            service: service.name.clone(),
            name: format!("{}-{}-{}", service.name, kind.member_label(), index),
            role: group.role.clone(),
            index,
            address: Ipv4Addr::from(address),
            is_lb: false,
        });
    }

    Ok(ServicePlan {
        service: service.name.clone(),
        topology: service.topology.tag().to_string(),
        group: kind,
        instances,
    })
}

/// Render a plan as pretty JSON for the orchestrator.
pub fn to_json(plan: &ExpansionPlan) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(plan)
}

/// JSON Schema describing [`ExpansionPlan`].
pub fn output_schema() -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(schemars::schema_for!(ExpansionPlan))
}
