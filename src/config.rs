use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::services::webdav::common::build_user_agent;
use crate::services::webdav::error::{DavError, Result};
use crate::services::webdav::transport::TransportOptions;

fn default_timeout_seconds() -> u64 {
    30
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

/// Connection settings of one WebDAV backup account
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DavConfig {
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl fmt::Debug for DavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("bucket", &self.bucket)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

impl DavConfig {
    pub fn new(address: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            bucket: String::new(),
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            insecure_skip_verify: false,
        }
    }

    /// Reads `WEBDAV_*` variables, loading `.env` first when present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let address = env::var("WEBDAV_ADDRESS")
            .map_err(|_| DavError::Config("WEBDAV_ADDRESS must be set".to_string()))?;
        let mut config = Self::new(
            address,
            env::var("WEBDAV_USERNAME").unwrap_or_default(),
            env::var("WEBDAV_PASSWORD").unwrap_or_default(),
        );

        config.port = parse_port(&env::var("WEBDAV_PORT").unwrap_or_default())?;
        config.bucket = env::var("WEBDAV_BUCKET").unwrap_or_default();

        if let Ok(value) = env::var("WEBDAV_TIMEOUT_SECONDS") {
            config.timeout_seconds = parse_seconds("WEBDAV_TIMEOUT_SECONDS", &value)?;
        }
        if let Ok(value) = env::var("WEBDAV_CONNECT_TIMEOUT_SECONDS") {
            config.connect_timeout_seconds = parse_seconds("WEBDAV_CONNECT_TIMEOUT_SECONDS", &value)?;
        }
        if let Ok(value) = env::var("WEBDAV_INSECURE_SKIP_VERIFY") {
            config.insecure_skip_verify = parse_bool(&value);
        }

        Ok(config)
    }

    /// Builds from a backup account's variable map. Values may be strings
    /// or numbers.
    pub fn from_vars(vars: &HashMap<String, Value>) -> Result<Self> {
        let mut config = Self::new(var(vars, "address"), var(vars, "username"), var(vars, "password"));
        config.port = parse_port(&var(vars, "port"))?;
        config.bucket = var(vars, "bucket");

        let timeout = var(vars, "timeout");
        if !timeout.is_empty() {
            config.timeout_seconds = parse_seconds("timeout", &timeout)?;
        }

        config.insecure_skip_verify = match vars.get("insecure_skip_verify") {
            Some(_) => parse_bool(&var(vars, "insecure_skip_verify")),
            None => config.address.trim().starts_with("https"),
        };

        Ok(config)
    }

    /// Address plus port as a URL string. An address without a scheme is
    /// taken as `http`; a configured port replaces one in the address.
    pub fn server_url(&self) -> Result<String> {
        let address = self.address.trim();
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| DavError::Config(format!("invalid address '{}': {}", address, e)))?;
        if let Some(port) = self.port {
            url.set_port(Some(port))
                .map_err(|_| DavError::Config(format!("cannot set port {} on '{}'", port, address)))?;
        }
        Ok(url.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(DavError::Config("address is required".to_string()));
        }

        let url = Url::parse(&self.server_url()?)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DavError::Config(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(DavError::Config(format!("address '{}' has no host", self.address)));
        }
        if self.timeout_seconds == 0 {
            return Err(DavError::Config("timeout must be greater than zero".to_string()));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(DavError::Config("connect timeout must be greater than zero".to_string()));
        }
        if self.insecure_skip_verify && url.scheme() == "https" {
            warn!("⚠️ TLS certificate verification is disabled for {}", url);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: self.timeout(),
            connect_timeout: self.connect_timeout(),
            accept_invalid_certs: self.insecure_skip_verify,
            user_agent: build_user_agent(),
        }
    }
}

fn var(vars: &HashMap<String, Value>, key: &str) -> String {
    match vars.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn parse_port(value: &str) -> Result<Option<u16>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<u16>()
        .map(Some)
        .map_err(|_| DavError::Config(format!("invalid port '{}'", value)))
}

fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| DavError::Config(format!("{} must be a whole number of seconds, got '{}'", key, value)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
