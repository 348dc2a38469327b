//! Label resolution: container metadata to routing configuration.
//!
//! A container opts in to proxying with `webtail.enabled=true`. The remaining
//! labels refine the derived route; every one of them has a documented
//! default, so resolution is a pure, total function of the metadata snapshot
//! plus the configured Docker network. No I/O, no panics.

use crate::config::ServiceConfig;
use crate::discovery::platform::ContainerMetadata;

/// Opt-in switch; must be `"true"` (case-insensitive).
pub const LABEL_ENABLED: &str = "webtail.enabled";
/// Upstream protocol override; defaults to [`DEFAULT_PROTOCOL`].
pub const LABEL_PROTOCOL: &str = "webtail.protocol";
/// Upstream port override; defaults to the lowest exposed port.
pub const LABEL_PORT: &str = "webtail.port";
/// Advertised node name override; defaults to the container name.
pub const LABEL_NODE_NAME: &str = "webtail.node_name";
/// Forward the original `Host` header; defaults to `false`.
pub const LABEL_PASS_HOST_HEADER: &str = "webtail.pass_host_header";
/// Trust inbound `X-Forwarded-*` headers; defaults to `false`.
pub const LABEL_TRUST_FORWARD_HEADER: &str = "webtail.trust_forward_header";

/// Default upstream protocol.
pub const DEFAULT_PROTOCOL: &str = "http";

/// Why a container was not eligible for proxying. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `webtail.enabled` missing or not `"true"`.
    NotEnabled,
    /// Enabled, but no port label and no exposed ports to detect one from.
    NoPort,
}

/// Outcome of resolving a container's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Eligible; proxy with this routing configuration.
    Route {
        /// The derived routing configuration.
        service: ServiceConfig,
        /// Set when the port came from the exposed ports rather than an
        /// explicit `webtail.port` label, so the caller can log the fallback.
        auto_detected_port: Option<u16>,
    },
    /// Not eligible.
    Skip(SkipReason),
}

/// Derive routing configuration from a container metadata snapshot.
///
/// `network` is the Docker network name the surrounding system guarantees the
/// container is reachable on by name; the target is synthesized as
/// `{scheme}://{container_name}.{network}:{port}`.
pub fn resolve(meta: &ContainerMetadata, network: &str) -> Resolution {
    let enabled = meta
        .labels
        .get(LABEL_ENABLED)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if !enabled {
        return Resolution::Skip(SkipReason::NotEnabled);
    }

    // Explicit port label wins; an unparsable value degrades to auto-detection.
    let (port, auto_detected_port) = match meta
        .labels
        .get(LABEL_PORT)
        .and_then(|v| v.parse::<u16>().ok())
    {
        Some(port) => (port, None),
        None => match lowest_exposed_port(&meta.exposed_ports) {
            Some(port) => (port, Some(port)),
            None => return Resolution::Skip(SkipReason::NoPort),
        },
    };

    let container_name = meta.name.strip_prefix('/').unwrap_or(&meta.name);

    let node_name = meta
        .labels
        .get(LABEL_NODE_NAME)
        .filter(|v| !v.is_empty())
        .map(String::as_str)
        .unwrap_or(container_name);

    let scheme = meta
        .labels
        .get(LABEL_PROTOCOL)
        .filter(|v| !v.is_empty())
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROTOCOL);

    let pass_host_header = parse_bool_label(meta.labels.get(LABEL_PASS_HOST_HEADER));
    let trust_forward_header = parse_bool_label(meta.labels.get(LABEL_TRUST_FORWARD_HEADER));

    Resolution::Route {
        service: ServiceConfig {
            target: format!("{scheme}://{container_name}.{network}:{port}"),
            node_name: node_name.to_string(),
            listen_addr: None,
            pass_host_header,
            trust_forward_header,
        },
        auto_detected_port,
    }
}

/// Fail-safe boolean parsing: anything outside `"true"`/`"false"` is `false`.
fn parse_bool_label(value: Option<&String>) -> bool {
    value.and_then(|v| v.parse::<bool>().ok()).unwrap_or(false)
}

/// Numerically lowest exposed port, excluding zero entries.
fn lowest_exposed_port(ports: &[u16]) -> Option<u16> {
    ports.iter().copied().filter(|p| *p > 0).min()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn metadata(name: &str, labels: &[(&str, &str)], ports: &[u16]) -> ContainerMetadata {
        ContainerMetadata {
            id: "c0ffee".to_string(),
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            exposed_ports: ports.to_vec(),
        }
    }

    fn expect_route(resolution: Resolution) -> ServiceConfig {
        match resolution {
            Resolution::Route { service, .. } => service,
            Resolution::Skip(reason) => panic!("expected route, got skip: {reason:?}"),
        }
    }

    fn expect_auto_detected(resolution: Resolution) -> Option<u16> {
        match resolution {
            Resolution::Route {
                auto_detected_port, ..
            } => auto_detected_port,
            Resolution::Skip(reason) => panic!("expected route, got skip: {reason:?}"),
        }
    }

    #[test]
    fn missing_enabled_label_skips() {
        let meta = metadata("/app", &[(LABEL_PORT, "8080")], &[80]);
        assert_eq!(
            resolve(&meta, "net"),
            Resolution::Skip(SkipReason::NotEnabled)
        );
    }

    #[test]
    fn non_true_enabled_values_skip_regardless_of_other_labels() {
        for value in ["false", "yes", "1", "", "TRUEISH"] {
            let meta = metadata(
                "/app",
                &[(LABEL_ENABLED, value), (LABEL_PORT, "8080")],
                &[80],
            );
            assert_eq!(
                resolve(&meta, "net"),
                Resolution::Skip(SkipReason::NotEnabled),
                "value {value:?} must not enable proxying"
            );
        }
    }

    #[test]
    fn enabled_is_case_insensitive() {
        for value in ["true", "True", "TRUE"] {
            let meta = metadata("/app", &[(LABEL_ENABLED, value)], &[8080]);
            assert!(matches!(resolve(&meta, "net"), Resolution::Route { .. }));
        }
    }

    #[test]
    fn explicit_port_label_wins_over_exposed_ports() {
        let meta = metadata(
            "/app",
            &[(LABEL_ENABLED, "true"), (LABEL_PORT, "9000")],
            &[80, 8080],
        );
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.target, "http://app.net:9000");
        // An explicit label is not auto-detection.
        assert_eq!(expect_auto_detected(resolve(&meta, "net")), None);
    }

    #[test]
    fn lowest_exposed_port_detected() {
        let meta = metadata("/app", &[(LABEL_ENABLED, "true")], &[8080, 80]);
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.target, "http://app.net:80");
        assert_eq!(expect_auto_detected(resolve(&meta, "net")), Some(80));
    }

    #[test]
    fn zero_ports_excluded_from_detection() {
        let meta = metadata("/app", &[(LABEL_ENABLED, "true")], &[0, 8080]);
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.target, "http://app.net:8080");
    }

    #[test]
    fn no_port_at_all_skips_with_no_port_reason() {
        let meta = metadata("/app", &[(LABEL_ENABLED, "true")], &[]);
        assert_eq!(resolve(&meta, "net"), Resolution::Skip(SkipReason::NoPort));
    }

    #[test]
    fn unparsable_port_label_falls_back_to_exposed_ports() {
        let meta = metadata(
            "/app",
            &[(LABEL_ENABLED, "true"), (LABEL_PORT, "eighty")],
            &[8080],
        );
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.target, "http://app.net:8080");
        // The fallback is reported as auto-detection so callers can log it.
        assert_eq!(expect_auto_detected(resolve(&meta, "net")), Some(8080));
    }

    #[test]
    fn node_name_defaults_to_container_name_without_separator() {
        let meta = metadata("/my-app", &[(LABEL_ENABLED, "true")], &[80]);
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.node_name, "my-app");
    }

    #[test]
    fn explicit_node_name_wins() {
        let meta = metadata(
            "/my-app",
            &[(LABEL_ENABLED, "true"), (LABEL_NODE_NAME, "frontend")],
            &[80],
        );
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.node_name, "frontend");
    }

    #[test]
    fn protocol_defaults_to_http_and_label_overrides() {
        let meta = metadata("/app", &[(LABEL_ENABLED, "true")], &[80]);
        let route = expect_route(resolve(&meta, "net"));
        assert!(route.target.starts_with("http://"));

        let meta = metadata(
            "/app",
            &[(LABEL_ENABLED, "true"), (LABEL_PROTOCOL, "https")],
            &[443],
        );
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(route.target, "https://app.net:443");
    }

    #[test]
    fn forward_flags_default_false_for_any_unparsable_value() {
        for value in ["", "yes", "1", "TRUE "] {
            let meta = metadata(
                "/app",
                &[
                    (LABEL_ENABLED, "true"),
                    (LABEL_PASS_HOST_HEADER, value),
                    (LABEL_TRUST_FORWARD_HEADER, value),
                ],
                &[80],
            );
            let route = expect_route(resolve(&meta, "net"));
            assert!(!route.pass_host_header, "value {value:?}");
            assert!(!route.trust_forward_header, "value {value:?}");
        }
    }

    #[test]
    fn forward_flags_parse_true() {
        let meta = metadata(
            "/app",
            &[
                (LABEL_ENABLED, "true"),
                (LABEL_PASS_HOST_HEADER, "true"),
                (LABEL_TRUST_FORWARD_HEADER, "true"),
            ],
            &[80],
        );
        let route = expect_route(resolve(&meta, "net"));
        assert!(route.pass_host_header);
        assert!(route.trust_forward_header);
    }

    #[test]
    fn end_to_end_defaults() {
        let meta = metadata("/app", &[(LABEL_ENABLED, "true")], &[8080]);
        let route = expect_route(resolve(&meta, "net"));
        assert_eq!(
            route,
            ServiceConfig {
                target: "http://app.net:8080".to_string(),
                node_name: "app".to_string(),
                listen_addr: None,
                pass_host_header: false,
                trust_forward_header: false,
            }
        );
    }
}
