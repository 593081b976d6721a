use crate::error::{ConfigError, WebhookError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const PRODUCTION_BASE_URL: &str = "https://api.polar.sh";
const SANDBOX_BASE_URL: &str = "https://sandbox-api.polar.sh";

/// Everything the host hands over in `initialize`.
#[derive(Debug, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub continue_on_fail: bool,
}

impl ExtensionConfig {
    pub fn from_params(params: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: ExtensionConfig = serde_json::from_value(params.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.authentication == Authentication::Secret
            && self
                .trigger
                .webhook_secret
                .as_ref()
                .map_or(true, |s| s.expose_secret().is_empty())
        {
            return Err(WebhookError::MissingSecret.into());
        }
        if self.pagination.page_size == 0 {
            return Err(ConfigError::Invalid("pagination.page_size must be positive".into()));
        }
        if self.pagination.max_pages == 0 {
            return Err(ConfigError::Invalid("pagination.max_pages must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_BASE_URL,
            Environment::Sandbox => SANDBOX_BASE_URL,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default = "empty_secret")]
    pub access_token: SecretString,
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's base URL. Only used against local mocks.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            access_token: empty_secret(),
            environment: Environment::default(),
            base_url: None,
        }
    }
}

impl Credentials {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authentication {
    None,
    #[default]
    Secret,
    Credentials,
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,
    /// Allow-list of event types. Empty means every event is emitted.
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub options: TriggerOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerOptions {
    #[serde(default = "default_validate_timestamp")]
    pub validate_timestamp: bool,
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance: u64,
    #[serde(default)]
    pub include_headers: bool,
    #[serde(default)]
    pub include_raw_body: bool,
}

fn default_validate_timestamp() -> bool {
    true
}
fn default_timestamp_tolerance() -> u64 {
    300
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            validate_timestamp: default_validate_timestamp(),
            timestamp_tolerance: default_timestamp_tolerance(),
            include_headers: false,
            include_raw_body: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    1000
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}
