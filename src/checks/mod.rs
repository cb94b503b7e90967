//! Built-in checks

pub mod endpoints;
pub mod extract_variables;
pub mod management_server;
pub mod policy_naming;

use crate::check::CheckRegistry;
use crate::config::Config;

/// Every built-in check, configured from `config`, in registration order.
/// No rule filtering happens here; see [`Config::should_run`].
pub fn builtin(config: &Config) -> CheckRegistry {
    let mut registry = CheckRegistry::new();

    registry.register_document(
        policy_naming::rule(),
        policy_naming::PolicyNamingCheck::new().with_extra_prefixes(&config.naming.prefixes),
    );
    registry.register_bundle(
        extract_variables::rule(),
        extract_variables::BodyGuardCheck::new(),
    );
    registry.register_document(
        endpoints::proxy_rule(),
        endpoints::EndpointCountCheck::proxy(config.limits.max_proxy_endpoints),
    );
    registry.register_document(
        endpoints::target_rule(),
        endpoints::EndpointCountCheck::target(config.limits.max_target_endpoints),
    );
    registry.register_document(
        management_server::rule(),
        management_server::ManagementServerCheck::new(),
    );

    registry
}
