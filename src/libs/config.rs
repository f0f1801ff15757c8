use crate::libs::dialect::DatabaseKind;
use crate::libs::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

pub const ENV_DATABASE_URL: &str = "TABLEDESK_DATABASE_URL";
pub const ENV_DATABASE_TYPE: &str = "TABLEDESK_DATABASE_TYPE";
pub const ENV_BIND: &str = "TABLEDESK_BIND";
pub const ENV_READ_ONLY: &str = "TABLEDESK_READ_ONLY";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default)]
    pub database_type: Option<String>,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default)]
    pub read_only: bool,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_connections() -> u32 {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

impl AppConfig {
    /// Configuration pointing at `database_url` with every other field at its
    /// default.
    pub fn for_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            database_type: None,
            bind: default_bind(),
            max_connections: default_max_connections(),
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            read_only: false,
        }
    }

    /// Read a TOML or YAML file (by extension), apply environment overrides
    /// and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut config = match ext.as_str() {
            "toml" => Self::from_toml_str(&text)?,
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension `{other}` for {} (expected .toml, .yaml or .yml)",
                    path.display()
                )));
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(path = %path.display(), kind = %config.database_kind()?, "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {e}")))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(tag) = lookup(ENV_DATABASE_TYPE) {
            self.database_type = Some(tag);
        }
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_BIND}=`{bind}` is not a socket address")))?;
        }
        if let Some(flag) = lookup(ENV_READ_ONLY) {
            self.read_only = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(Error::Config(format!(
                        "{ENV_READ_ONLY}=`{flag}` is not a boolean"
                    )));
                }
            };
        }
        Ok(())
    }

    /// The backend named by `database_type`, or inferred from the URL scheme.
    pub fn database_kind(&self) -> Result<DatabaseKind> {
        match &self.database_type {
            Some(tag) => DatabaseKind::from_tag(tag),
            None => DatabaseKind::from_url(&self.database_url),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("database_url must not be empty".into()));
        }
        let kind = self.database_kind()?;
        if self.database_type.is_some() {
            if let Ok(from_url) = DatabaseKind::from_url(&self.database_url) {
                if from_url != kind {
                    return Err(Error::Config(format!(
                        "database_type `{kind}` does not match the `{from_url}` database_url"
                    )));
                }
            }
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be greater than zero".into()));
        }
        if self.page_size == 0 || self.max_page_size == 0 {
            return Err(Error::Config("page sizes must be greater than zero".into()));
        }
        if self.page_size > self.max_page_size {
            return Err(Error::Config(format!(
                "page_size {} exceeds max_page_size {}",
                self.page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}
