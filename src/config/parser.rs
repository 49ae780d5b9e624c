use super::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        let config_path = dir.join("warden.yaml");
        if config_path.exists() {
            return Ok(config_path);
        }

        // Try alternate name
        let alt_path = dir.join("warden.yml");
        if alt_path.exists() {
            return Ok(alt_path);
        }

        // Try parent directory
        if let Some(parent) = dir.parent() {
            return Self::find_config_in_dir(parent);
        }

        Err(Error::Config(
            "Could not find warden.yaml in current directory or any parent".to_string(),
        ))
    }

    /// Load and validate config from a file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse and validate config from a YAML string
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let yaml = r#"
startup_delay: "2s"
liveness_interval: "10s"
health_interval: "30s"

services:
  - name: backend
    command: "node backend-server.js"
    port: 3000
    healthcheck: "http://localhost:3000/api/health"
    max_restarts: 5

  - name: bridge
    command: "node ai-bridge.js"
    port: 3001
    healthcheck: "http://localhost:3001/status"
    environment:
      NODE_ENV: production
"#;
        let config = Parser::new().parse_config(yaml).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].name, "backend");
        assert_eq!(config.services[1].environment["NODE_ENV"], "production");
    }

    #[test]
    fn parse_rejects_invalid_yaml() {
        let result = Parser::new().parse_config("services: [not: {valid");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn parse_runs_validation() {
        // Well-formed YAML but semantically invalid (no services)
        let result = Parser::new().parse_config("startup_delay: \"1s\"");
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn find_config_in_dir_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("warden.yaml"), "services: []").unwrap();

        let found = Parser::find_config_in_dir(&nested).unwrap();
        assert_eq!(found, dir.path().join("warden.yaml"));
    }
}
