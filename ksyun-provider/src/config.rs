//! Provider configuration
//!
//! Built from the provider block's attributes, with environment variables
//! as fallback for anything the block leaves out.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use ksyun_core::resource::Value;
use ksyun_core::retry::DEFAULT_MAX_RETRIES;
use thiserror::Error;

pub const ENV_REGION: &str = "KSYUN_REGION";
pub const ENV_ACCESS_KEY: &str = "KSYUN_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "KSYUN_SECRET_KEY";
pub const ENV_ENDPOINT: &str = "KSYUN_ENDPOINT";

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Errors in the provider block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting '{name}' (or environment variable {env})")]
    Missing { name: &'static str, env: &'static str },

    #[error("Invalid value for '{name}': {message}")]
    Invalid { name: &'static str, message: String },
}

/// Settings shared by every call the provider makes
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Overrides the regional endpoint
    pub endpoint: Option<String>,
    /// Retries after the first attempt of a retried call
    pub max_retries: u32,
    pub retry_interval: Duration,
    /// Skip TLS verification in the transport
    pub insecure: bool,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("region", &self.region)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl ProviderConfig {
    /// Configuration with explicit credentials and default retry settings
    pub fn new(
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            endpoint: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            insecure: false,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Read the provider block, falling back to the process environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        Self::resolve(attributes, |name| std::env::var(name).ok())
    }

    /// Read the provider block with a custom environment lookup
    pub fn resolve(
        attributes: &HashMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let block = Block(attributes);
        let setting = |name: &'static str, var: &'static str| -> Result<String, ConfigError> {
            block
                .get_string(name)
                .map(str::to_string)
                .or_else(|| env(var))
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing { name, env: var })
        };

        let region = setting("region", ENV_REGION)?;
        let access_key = setting("access_key", ENV_ACCESS_KEY)?;
        let secret_key = setting("secret_key", ENV_SECRET_KEY)?;
        let endpoint = block
            .get_string("endpoint")
            .map(str::to_string)
            .or_else(|| env(ENV_ENDPOINT))
            .filter(|v| !v.is_empty());

        let max_retries = match block.get_int("max_retries") {
            None => DEFAULT_MAX_RETRIES,
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::Invalid {
                name: "max_retries",
                message: format!("expected a non-negative number, got {}", n),
            })?,
        };
        let retry_interval = match block.get_int("retry_interval") {
            None => DEFAULT_RETRY_INTERVAL,
            Some(n) => u64::try_from(n)
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    name: "retry_interval",
                    message: format!("expected a non-negative number of seconds, got {}", n),
                })?,
        };

        Ok(Self {
            region,
            access_key,
            secret_key,
            endpoint,
            max_retries,
            retry_interval,
            insecure: block.get_bool_or("insecure", false),
        })
    }
}

/// Typed accessors over the provider block
struct Block<'a>(&'a HashMap<String, Value>);

impl Block<'_> {
    fn get_string(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}
