//! Connection configuration.
//!
//! Serialisable so deployments can ship a JSON file instead of patching
//! defaults in code. Unset fields fall back to the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where one expansion port's daemon socket lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub name: String,
    pub socket_path: PathBuf,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "A".into(),
            socket_path: "/var/run/portlinkd/port_a".into(),
        }
    }
}

/// Full board connection configuration: both expansion ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub port_a: PortConfig,
    pub port_b: PortConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            port_a: PortConfig::default(),
            port_b: PortConfig {
                name: "B".into(),
                socket_path: "/var/run/portlinkd/port_b".into(),
            },
        }
    }
}

impl BoardConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_standard_sockets() {
        let config = BoardConfig::default();
        assert_eq!(config.port_a.name, "A");
        assert_eq!(
            config.port_a.socket_path,
            PathBuf::from("/var/run/portlinkd/port_a")
        );
        assert_eq!(config.port_b.name, "B");
        assert_eq!(
            config.port_b.socket_path,
            PathBuf::from("/var/run/portlinkd/port_b")
        );
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config =
            BoardConfig::from_json(r#"{"port_b": {"name": "B", "socket_path": "/tmp/b.sock"}}"#)
                .unwrap();
        assert_eq!(config.port_a, PortConfig::default());
        assert_eq!(config.port_b.name, "B");
        assert_eq!(config.port_b.socket_path, PathBuf::from("/tmp/b.sock"));
    }

    #[test]
    fn round_trips_through_json() {
        let config = BoardConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(BoardConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(BoardConfig::from_json("{port_a:}").is_err());
    }
}
