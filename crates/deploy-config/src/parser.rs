//! Configuration parser with environment variable substitution

use crate::{Config, ConfigError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
    })
}

/// Parse a YAML configuration file
///
/// Relative artifact paths in the file resolve against its directory.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_str(&content)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
}

/// Parse YAML configuration from a string, substituting from the process environment
pub fn parse_str(content: &str) -> Result<Config> {
    parse_str_with(content, |name| std::env::var(name).ok())
}

/// Parse YAML configuration from a string with a custom variable lookup
pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let substituted = substitute_vars(content, lookup)?;
    let config: Config = serde_yaml::from_str(&substituted)?;
    validate_config(&config)?;
    Ok(config)
}

/// Substitute `${VAR}` and `${VAR:-default}` references
///
/// Every variable that is unset and has no default is reported in one error.
pub fn substitute_vars<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();

    let result = var_pattern().replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result.into_owned())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.version != "1.0" {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected 1.0",
            config.version
        )));
    }

    if config.host.address.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "host.address must not be empty".to_string(),
        ));
    }

    if config.remote_dir.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "remote_dir must not be empty".to_string(),
        ));
    }

    if config.probe.attempts == 0 {
        return Err(ConfigError::ValidationError(
            "probe.attempts must be at least 1".to_string(),
        ));
    }

    crate::convert::service_registry(config)?;

    let unnamed_container = config
        .strategies
        .containerized
        .as_ref()
        .is_some_and(|c| c.container_name.trim().is_empty() || c.image.trim().is_empty());
    if unnamed_container {
        return Err(ConfigError::ValidationError(
            "strategies.containerized needs container_name and image".to_string(),
        ));
    }

    if config.enabled_strategies().is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one strategy must be enabled".to_string(),
        ));
    }

    Ok(())
}
