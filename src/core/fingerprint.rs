//! BLAKE3 fingerprints of expansion plans.
//!
//! The digest covers the canonical JSON form of the plan (every service and
//! instance field, in plan order), so two plans share a fingerprint exactly
//! when an orchestrator would receive the same document.

use super::types::ExpansionPlan;

/// Fingerprint a plan. Returns `"blake3:{hex}"`.
pub fn fingerprint(plan: &ExpansionPlan) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, plan)?;
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}
