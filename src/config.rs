use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::paths::Terminology;

/// Config file looked up in the working directory when --config is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".config-sync.toml";

pub const REPOSITORY_ACCESS_TOKEN: &str = "REPOSITORY_ACCESS_TOKEN";
pub const REPO_NAME: &str = "REPO_NAME";
pub const BRANCH_REF: &str = "BRANCH_REF";
pub const BEFORE_COMMIT_SHA: &str = "BEFORE_COMMIT_SHA";
pub const AFTER_COMMIT_SHA: &str = "AFTER_COMMIT_SHA";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Snapshot of the process environment taken once at start-up.
///
/// Empty values are treated as unset: CI systems expand missing secrets
/// to an empty string.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn capture() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or(ConfigError::MissingEnv(key))
    }
}

/// Inputs describing the push that triggered the run.
#[derive(Clone)]
pub struct TriggerContext {
    pub access_token: String,
    /// `owner/name`
    pub repository: String,
    pub branch_ref: String,
    pub before_commit: String,
    pub after_commit: String,
}

impl TriggerContext {
    pub fn from_env(env: &Environment) -> Result<Self, ConfigError> {
        Ok(Self {
            access_token: env.require(REPOSITORY_ACCESS_TOKEN)?,
            repository: env.require(REPO_NAME)?,
            branch_ref: env.require(BRANCH_REF)?,
            before_commit: env.require(BEFORE_COMMIT_SHA)?,
            after_commit: env.require(AFTER_COMMIT_SHA)?,
        })
    }
}

impl std::fmt::Debug for TriggerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerContext")
            .field("access_token", &"<redacted>")
            .field("repository", &self.repository)
            .field("branch_ref", &self.branch_ref)
            .field("before_commit", &self.before_commit)
            .field("after_commit", &self.after_commit)
            .finish()
    }
}

/// Top-level configuration loaded from .config-sync.toml.
/// All fields are optional; the tool works with zero config.
/// Secrets are never read from the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Only pushes to these refs reach storage.
    pub allowed_branches: Vec<String>,

    /// Paths starting with any of these are never synced.
    pub reserved_prefixes: Vec<String>,

    /// Maximum number of concurrent file content requests.
    pub fetch_concurrency: usize,

    /// Wording used for the two path levels in logs and reports.
    pub terminology: Terminology,

    /// Container metadata key rewritten on every sync.
    pub bump_metadata_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allowed_branches: vec![
                "refs/heads/master".to_string(),
                "refs/heads/main".to_string(),
            ],
            reserved_prefixes: vec![".github".to_string()],
            fetch_concurrency: 4,
            terminology: Terminology::default(),
            bump_metadata_key: "bump".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .config-sync.toml in the
    /// current directory. Returns the default config if neither exists.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger_env() -> Environment {
        Environment::from_pairs([
            (REPOSITORY_ACCESS_TOKEN, "ghp_secret"),
            (REPO_NAME, "org/config"),
            (BRANCH_REF, "refs/heads/main"),
            (BEFORE_COMMIT_SHA, "aaa"),
            (AFTER_COMMIT_SHA, "bbb"),
        ])
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.sync.allowed_branches,
            vec!["refs/heads/master", "refs/heads/main"]
        );
        assert_eq!(config.sync.reserved_prefixes, vec![".github"]);
        assert_eq!(config.sync.fetch_concurrency, 4);
        assert_eq!(config.sync.terminology, Terminology::TenantDevice);
        assert_eq!(config.sync.bump_metadata_key, "bump");
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[sync]
allowed_branches = ["refs/heads/release"]
fetch_concurrency = 8
terminology = "storage-account-container"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sync.allowed_branches, vec!["refs/heads/release"]);
        assert_eq!(config.sync.fetch_concurrency, 8);
        assert_eq!(config.sync.terminology, Terminology::StorageAccountContainer);
        // Unset fields keep their defaults
        assert_eq!(config.sync.reserved_prefixes, vec![".github"]);
        assert_eq!(config.sync.bump_metadata_key, "bump");
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.fetch_concurrency, 4);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = Config::load(Some(Path::new("does/not/exist.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn test_trigger_context_from_env() {
        let trigger = TriggerContext::from_env(&trigger_env()).unwrap();
        assert_eq!(trigger.repository, "org/config");
        assert_eq!(trigger.branch_ref, "refs/heads/main");
        assert_eq!(trigger.before_commit, "aaa");
        assert_eq!(trigger.after_commit, "bbb");
        assert!(!format!("{:?}", trigger).contains("ghp_secret"));
    }

    #[test]
    fn test_trigger_context_missing_variable() {
        let env = Environment::from_pairs([(REPO_NAME, "org/config")]);
        let err = TriggerContext::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(REPOSITORY_ACCESS_TOKEN)));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let env = Environment::from_pairs([("A", ""), ("B", "value")]);
        assert_eq!(env.get("A"), None);
        assert_eq!(env.get("B"), Some("value"));
        assert_eq!(env.get("C"), None);
    }
}
