//! Config round-trip tests.
//!
//! Tests the full config lifecycle: write a JSON file, load it through
//! `Config::load`, and assert the values and validation behavior match. Each
//! test uses a tempdir for isolation.

use tempfile::tempdir;

use webtail::config::Config;
use webtail::error::ConfigError;

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn full_config_round_trips() {
    let dir = tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "services": [
                {
                    "target": "http://localhost:3000",
                    "node_name": "grafana",
                    "pass_host_header": true
                },
                {
                    "target": "https://internal.example.com",
                    "node_name": "wiki",
                    "listen_addr": "127.0.0.1:8443",
                    "trust_forward_header": true
                }
            ],
            "docker": {
                "host": "unix:///var/run/docker.sock",
                "network": "webtail"
            },
            "listen": { "host": "0.0.0.0" }
        }"#,
    );

    let config = Config::load(&path, true).unwrap();

    assert_eq!(config.services.len(), 2);
    let grafana = &config.services[0];
    assert_eq!(grafana.target, "http://localhost:3000");
    assert_eq!(grafana.node_name, "grafana");
    assert!(grafana.pass_host_header);
    assert!(!grafana.trust_forward_header);
    assert_eq!(grafana.listen_addr, None);

    let wiki = &config.services[1];
    assert_eq!(wiki.listen_addr.as_deref(), Some("127.0.0.1:8443"));
    assert!(wiki.trust_forward_header);

    assert_eq!(
        config.docker.host.as_deref(),
        Some("unix:///var/run/docker.sock")
    );
    assert_eq!(config.docker.network, "webtail");
    assert_eq!(config.listen.host, "0.0.0.0");
}

#[test]
fn minimal_docker_only_config() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, r#"{ "docker": { "network": "apps" } }"#);

    let config = Config::load(&path, true).unwrap();

    assert!(config.services.is_empty());
    assert_eq!(config.docker.network, "apps");
    // Listener defaults kick in when the section is absent.
    assert_eq!(config.listen.host, "127.0.0.1");
}

#[test]
fn serialized_config_loads_back() {
    let dir = tempdir().unwrap();
    let config = Config {
        services: vec![webtail::config::ServiceConfig {
            target: "http://localhost:9090".to_string(),
            node_name: "prometheus".to_string(),
            listen_addr: None,
            pass_host_header: false,
            trust_forward_header: false,
        }],
        ..Default::default()
    };

    let path = write_config(&dir, &serde_json::to_string_pretty(&config).unwrap());
    let loaded = Config::load(&path, false).unwrap();

    assert_eq!(loaded.services, config.services);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("does-not-exist.json");

    assert!(matches!(
        Config::load(&path, false),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = write_config(&dir, "{ not json");

    assert!(matches!(
        Config::load(&path, false),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn validation_failures_surface_through_load() {
    let dir = tempdir().unwrap();

    // Empty config with no discovery: nothing to run.
    let path = write_config(&dir, "{}");
    assert!(matches!(
        Config::load(&path, false),
        Err(ConfigError::NothingToRun)
    ));

    // Discovery enabled but no network configured.
    assert!(matches!(
        Config::load(&path, true),
        Err(ConfigError::MissingDockerSetting { .. })
    ));

    // Bad target URL.
    let path = write_config(
        &dir,
        r#"{ "services": [ { "target": "ftp://x", "node_name": "x" } ] }"#,
    );
    assert!(matches!(
        Config::load(&path, false),
        Err(ConfigError::InvalidValue { .. })
    ));
}
