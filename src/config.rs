//! Harness configuration
//!
//! Defaults target the shared test repository. A TOML file named by
//! `MERGE_QUEUE_PROBE_CONFIG` may override any non-secret field; credentials
//! are read from the environment only.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "MERGE_QUEUE_PROBE_CONFIG";

/// Environment variable holding the automation app's PEM private key
pub const APP_PRIVATE_KEY_ENV: &str = "GITHUB_APP_PRIVATE_KEY";

/// Environment variable holding the user's personal access token
pub const USER_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Credentials for the two identities the harness acts as
#[derive(Clone, Default)]
pub struct Credentials {
    /// PEM private key of the automation app (rulesets, workflows, branches)
    pub app_private_key: Option<String>,
    /// Personal access token (PR creation, auto-merge, reads)
    pub user_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_private_key", &self.app_private_key.as_ref().map(|_| "<redacted>"))
            .field("user_token", &self.user_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where and as whom the harness operates
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// API base URL (None for api.github.com)
    pub api_base: Option<String>,
    /// Automation app id
    pub app_id: u64,
    /// Installation of the automation app on `owner`
    pub installation_id: u64,
    /// Integration that must report the required status check (GitHub Actions)
    pub actions_integration_id: u64,
    /// Integration allowed to bypass the ruleset (the automation app)
    pub bypass_integration_id: u64,
    /// Secrets
    pub credentials: Credentials,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            owner: "0x5b-org".to_string(),
            repo: "test-github-merge-queues".to_string(),
            api_base: None,
            app_id: 1_178_750,
            installation_id: 65_717_473,
            actions_integration_id: 15368,
            bypass_integration_id: 1_178_750,
            credentials: Credentials::default(),
        }
    }
}

/// On-disk overrides; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    owner: Option<String>,
    repo: Option<String>,
    api_base: Option<String>,
    app_id: Option<u64>,
    installation_id: Option<u64>,
    actions_integration_id: Option<u64>,
    bypass_integration_id: Option<u64>,
}

impl HarnessConfig {
    /// Load from defaults, the optional config file, and the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` to resolve environment variables
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            config.apply_file(Path::new(&path))?;
        }

        config.credentials = Credentials {
            app_private_key: env(APP_PRIVATE_KEY_ENV).filter(|v| !v.trim().is_empty()),
            user_token: env(USER_TOKEN_ENV).filter(|v| !v.trim().is_empty()),
        };

        tracing::debug!(
            owner = %config.owner,
            repo = %config.repo,
            api_base = ?config.api_base,
            "loaded harness config"
        );
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;

        if let Some(base) = &file.api_base {
            url::Url::parse(base)
                .map_err(|e| Error::Config(format!("invalid api_base {base:?}: {e}")))?;
        }

        if let Some(owner) = file.owner {
            self.owner = owner;
        }
        if let Some(repo) = file.repo {
            self.repo = repo;
        }
        if file.api_base.is_some() {
            self.api_base = file.api_base;
        }
        if let Some(id) = file.app_id {
            self.app_id = id;
        }
        if let Some(id) = file.installation_id {
            self.installation_id = id;
        }
        if let Some(id) = file.actions_integration_id {
            self.actions_integration_id = id;
        }
        if let Some(id) = file.bypass_integration_id {
            self.bypass_integration_id = id;
        }
        Ok(())
    }

    /// The app private key, or a config error naming the variable
    pub fn app_private_key(&self) -> Result<&str> {
        self.credentials
            .app_private_key
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{APP_PRIVATE_KEY_ENV} is not set")))
    }

    /// The user token, or a config error naming the variable
    pub fn user_token(&self) -> Result<&str> {
        self.credentials
            .user_token
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{USER_TOKEN_ENV} is not set")))
    }
}
