use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub flush_every_write: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Receives the `created` notification for every new request.
    pub admin_recipient: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub subject_prefix: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            admin_recipient: "admin".to_string(),
            base_url: None,
            subject_prefix: String::new(),
        }
    }
}

impl NotifyConfig {
    /// `{base_url}/requests/{id}` when a base url is configured.
    pub fn request_link(&self, request_id: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/requests/{}", base.trim_end_matches('/'), request_id))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            anyhow::bail!("store.path must not be empty");
        }
        if self.notify.admin_recipient.trim().is_empty() {
            anyhow::bail!("notify.admin_recipient must not be empty");
        }
        if let Some(base) = &self.notify.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                anyhow::bail!("notify.base_url must start with http:// or https://, got '{base}'");
            }
        }
        Ok(())
    }
}
