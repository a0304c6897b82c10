//! Rule resolution: which proxies apply to a browsed host
//!
//! Rules are scanned in stored order and the first matching pattern wins.
//! Its host ids are mapped to proxy directives and `DIRECT` is always
//! appended as the fallback.

use crate::matcher;
use crate::model::{Host, HostConfig, ProxyType, Rule};
use tracing::trace;

/// Fallback directive appended to every resolution
pub const DIRECT: &str = "DIRECT";

/// Separator between directives in a PAC result
pub const DIRECTIVE_SEPARATOR: &str = ";";

/// Find the first rule whose pattern matches `host`
pub fn matching_rule<'a>(config: &'a HostConfig, host: &str) -> Option<&'a Rule> {
    config
        .rules
        .iter()
        .find(|rule| matcher::matches(host, &rule.pattern))
}

/// Hosts of the first matching rule, in the rule's id order.
/// Ids that do not resolve to a configured host are skipped.
pub fn hosts_for_rule<'a>(config: &'a HostConfig, host: &str) -> Vec<&'a Host> {
    let Some(rule) = matching_rule(config, host) else {
        trace!("No rule matches {}", host);
        return Vec::new();
    };

    trace!("{} matched rule {}", host, rule.pattern);

    rule.host_ids
        .iter()
        .filter_map(|id| config.host(*id))
        .collect()
}

/// Render one proxy directive, e.g. `SOCKS proxy.example.com:1080`
pub fn directive(host: &Host) -> String {
    format!(
        "{} {}:{}",
        host.proxy_type.unwrap_or(ProxyType::Proxy),
        host.host,
        host.port
    )
}

/// Resolve the directive list for a request.
///
/// `url` is part of the `FindProxyForURL` contract but only `host` takes
/// part in matching.
pub fn resolve(config: &HostConfig, _url: &str, host: &str) -> String {
    hosts_for_rule(config, host)
        .into_iter()
        .map(directive)
        .chain(std::iter::once(DIRECT.to_string()))
        .collect::<Vec<_>>()
        .join(DIRECTIVE_SEPARATOR)
}

/// Single-winner view used by the pre-expanded PAC format: every rule in
/// order, paired with the host of its first id. Later ids are never looked
/// at. Rules with no ids or a dangling first id keep their position with
/// `None` so they still shadow the rules after them.
pub fn first_hosts(config: &HostConfig) -> Vec<(&Rule, Option<&Host>)> {
    config
        .rules
        .iter()
        .map(|rule| {
            let host = rule.host_ids.first().and_then(|id| config.host(*id));
            (rule, host)
        })
        .collect()
}
