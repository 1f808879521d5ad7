//! Process configuration.
//!
//! Values come from an optional TOML file, then environment variables
//! override them:
//!
//! | variable                 | field          |
//! |--------------------------|----------------|
//! | `MESHGRAPH_DB`           | `db_path`      |
//! | `MESHGRAPH_MAP_SIZE`     | `map_size`     |
//! | `MESHGRAPH_MAX_DEPTH`    | `max_depth`    |
//! | `MESHGRAPH_GRANT_POLICY` | `grant_policy` |
//! | `PORT`                   | `listen_addr` (port on 0.0.0.0) |
//! | `MESHGRAPH_ROOT_TOKEN`   | `root_token`   |

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::constants::{DEFAULT_MAP_SIZE, MAX_INHERITANCE_DEPTH};
use crate::error::{err, GraphError, Result};

/// Who may grant and revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantPolicy {
    /// Caller needs at least the granted level, and never less than MGMT.
    #[default]
    MatchLevel,
    /// Caller needs ADMIN on the target.
    AdminOnly,
}

impl FromStr for GrantPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "match_level" => Ok(GrantPolicy::MatchLevel),
            "admin_only" => Ok(GrantPolicy::AdminOnly),
            other => Err(GraphError::InvalidArgument(format!("unknown grant policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,
    pub map_size: usize,
    pub max_depth: usize,
    pub grant_policy: GrantPolicy,
    pub listen_addr: String,
    /// Shared secret that elevates a request to root. Unset disables elevation.
    pub root_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "./data/meshgraph.mdb".into(),
            map_size: DEFAULT_MAP_SIZE,
            max_depth: MAX_INHERITANCE_DEPTH,
            grant_policy: GrantPolicy::default(),
            listen_addr: "0.0.0.0:3000".into(),
            root_token: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| GraphError::InvalidArgument(format!("config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(err)?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Config::default().with_overrides(|k| std::env::var(k).ok())
    }

    /// Apply overrides from a variable lookup (the environment, or a map in tests).
    pub fn with_overrides<F: Fn(&str) -> Option<String>>(mut self, var: F) -> Result<Self> {
        if let Some(v) = var("MESHGRAPH_DB") {
            self.db_path = v;
        }
        if let Some(v) = var("MESHGRAPH_MAP_SIZE") {
            self.map_size = parse_num("MESHGRAPH_MAP_SIZE", &v)?;
        }
        if let Some(v) = var("MESHGRAPH_MAX_DEPTH") {
            self.max_depth = parse_num("MESHGRAPH_MAX_DEPTH", &v)?;
        }
        if let Some(v) = var("MESHGRAPH_GRANT_POLICY") {
            self.grant_policy = v.parse()?;
        }
        if let Some(v) = var("PORT") {
            let port: u16 = parse_num("PORT", &v)?;
            self.listen_addr = format!("0.0.0.0:{}", port);
        }
        if let Some(v) = var("MESHGRAPH_ROOT_TOKEN") {
            self.root_token = if v.is_empty() { None } else { Some(v) };
        }
        if self.max_depth == 0 {
            return Err(GraphError::InvalidArgument("max_depth must be positive".into()));
        }
        Ok(self)
    }
}

fn parse_num<T: FromStr>(name: &str, v: &str) -> Result<T> {
    v.trim()
        .parse()
        .map_err(|_| GraphError::InvalidArgument(format!("{} is not a number: '{}'", name, v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.max_depth, MAX_INHERITANCE_DEPTH);
        assert_eq!(c.grant_policy, GrantPolicy::MatchLevel);
        assert!(c.root_token.is_none());
    }

    #[test]
    fn test_toml_partial() {
        let c = Config::from_toml_str("db_path = \"/tmp/x\"\ngrant_policy = \"admin_only\"\n").unwrap();
        assert_eq!(c.db_path, "/tmp/x");
        assert_eq!(c.grant_policy, GrantPolicy::AdminOnly);
        assert_eq!(c.map_size, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn test_toml_rejects_bad_policy() {
        assert!(Config::from_toml_str("grant_policy = \"anyone\"").is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MESHGRAPH_DB", "/var/lib/mg"),
            ("MESHGRAPH_MAX_DEPTH", "8"),
            ("MESHGRAPH_GRANT_POLICY", "ADMIN_ONLY"),
            ("PORT", "8080"),
            ("MESHGRAPH_ROOT_TOKEN", "s3cret"),
        ]
        .into_iter()
        .collect();
        let c = Config::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.db_path, "/var/lib/mg");
        assert_eq!(c.max_depth, 8);
        assert_eq!(c.grant_policy, GrantPolicy::AdminOnly);
        assert_eq!(c.listen_addr, "0.0.0.0:8080");
        assert_eq!(c.root_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_bad_override() {
        assert!(Config::default().with_overrides(|k| (k == "PORT").then(|| "http".to_string())).is_err());
        assert!(Config::default()
            .with_overrides(|k| (k == "MESHGRAPH_MAX_DEPTH").then(|| "0".to_string()))
            .is_err());
    }
}
