// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service configuration merge and ACL redaction.
//!
//! Both functions are pure; they run between the last pipeline check and
//! envelope encoding, so no other step needs to know the ACL policy.

use serde_json::{Map, Value};

use crate::context::TrustContext;

/// Reserved bucket of configuration shared across all services for a tenant.
pub const COMMON_FIELDS_KEY: &str = "commonFields";

/// Narrow the tenant-wide `services_config` down to what `service_name` may
/// see.
///
/// Common fields populate generic keys first-writer-wins; the per-service
/// block is then installed under its own key as an atomic unit, replacing any
/// common-fields value that landed on that same key. The per-service block is
/// never field-merged with common fields; downstream services rely on
/// `config[service_name]` being exactly the provisioned block.
pub fn merge_service_config(
    services_config: &Map<String, Value>,
    service_name: &str,
) -> Map<String, Value> {
    let mut merged = Map::new();

    if let Some(Value::Object(common)) = services_config.get(COMMON_FIELDS_KEY) {
        for (field, value) in common {
            if !merged.contains_key(field) {
                merged.insert(field.clone(), value.clone());
            }
        }
    }

    if let Some(block) = services_config.get(service_name) {
        merged.insert(service_name.to_string(), block.clone());
    }

    merged
}

/// Strip application and package ACLs unless the resolving service declared
/// `requires_package_acl`. Runs last, after all other fields are populated.
pub fn apply_acl_redaction(context: &mut TrustContext, requires_package_acl: bool) {
    if requires_package_acl {
        return;
    }
    context.application.acl = None;
    context.application.acl_all_env = None;
    context.package.acl = None;
    context.package.acl_all_env = None;
}
