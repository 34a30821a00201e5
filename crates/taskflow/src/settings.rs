//! Engine-level configuration: database path, runs root, default retry
//! policy, and worker concurrency.
//!
//! Layered TOML-plus-environment loading in the style of
//! `cloacina-ctl/src/config/{types,loader,error}.rs`, scaled down to this
//! crate's single sqlite backend and without the teacher's `dirs`-based
//! user-config-dir search path (dropped per `DESIGN.md`).

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures loading or interpreting engine settings. Distinct from
/// [`crate::error::ConfigError`], which covers DAG *content* validation;
/// this covers the engine's own startup configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("environment variable '{0}' referenced by ${{{0}:?}} is not set: {1}")]
    RequiredVar(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskflowConfig {
    pub database: DatabaseConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub runs_root: PathBuf,
    pub default_max_retries: u32,
    pub default_retry_delay: u64,
    pub max_concurrency: usize,
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "taskflow.sqlite3".to_string(),
            pool_size: 8,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("runs"),
            default_max_retries: 3,
            default_retry_delay: 3,
            max_concurrency: crate::scheduler::DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl TaskflowConfig {
    /// Loads settings from an optional TOML file, falling back to defaults
    /// for any field the file omits, then substitutes `${VAR}` references
    /// against the process environment (`dotenvy`-loaded `.env` included).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let substituted = substitute_env_vars(&raw)?;

        toml::from_str(&substituted).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Expands `${VAR}`, `${VAR:-default}`, and `${VAR:?error message}` against
/// the process environment, matching `cloacina-ctl`'s loader.
fn substitute_env_vars(input: &str) -> Result<String, SettingsError> {
    let pattern = Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid");
    let mut error = None;

    let result = pattern
        .replace_all(input, |caps: &regex::Captures| {
            let expr = &caps[1];
            match process_var_expression(expr) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        })
        .into_owned();

    match error {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

fn process_var_expression(expr: &str) -> Result<String, SettingsError> {
    if let Some((name, default)) = expr.split_once(":-") {
        return Ok(std::env::var(name).unwrap_or_else(|_| default.to_string()));
    }
    if let Some((name, message)) = expr.split_once(":?") {
        return std::env::var(name)
            .map_err(|_| SettingsError::RequiredVar(name.to_string(), message.to_string()));
    }
    std::env::var(expr).or_else(|_| Ok(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = TaskflowConfig::load(Some(std::path::Path::new("/no/such/file.toml")))
            .unwrap();
        assert_eq!(config.execution.default_max_retries, 3);
    }

    #[test]
    fn substitutes_default_when_var_unset() {
        std::env::remove_var("TASKFLOW_TEST_VAR_UNSET");
        let out = substitute_env_vars("url = \"${TASKFLOW_TEST_VAR_UNSET:-sqlite.db}\"").unwrap();
        assert_eq!(out, "url = \"sqlite.db\"");
    }

    #[test]
    fn required_var_missing_errors() {
        std::env::remove_var("TASKFLOW_TEST_REQUIRED_VAR");
        let result = substitute_env_vars("url = \"${TASKFLOW_TEST_REQUIRED_VAR:?must be set}\"");
        assert!(matches!(result, Err(SettingsError::RequiredVar(_, _))));
    }
}
