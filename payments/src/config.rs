//! Configuration loading and default template generation.
//!
//! - [`Config`] — server, provider, polling and merchant seed settings.
//! - [`load_config`] — reads and parses a TOML configuration file.
//! - [`generate_default_config`] — produces a commented TOML template.
//!
//! # Configuration File Format
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//!
//! [provider]
//! base_url = "https://api.mercadopago.com"
//! timeout_secs = 30
//! currency = "BRL"
//!
//! [confirmation]
//! interval_ms = 3000
//! max_attempts = 10
//!
//! [merchants."pizzaria-centro"]
//! public_key = "$PIZZARIA_PUBLIC_KEY"
//! secret_key = "${PIZZARIA_SECRET_KEY}"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::confirmation::RetryPolicy;
use crate::credential::PaymentCredential;
use crate::error::Error;
use crate::provider::DEFAULT_BASE_URL;
use crate::service::{DEFAULT_CURRENCY, ServiceSettings};

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address. Falls back to `HOST`, then `0.0.0.0`.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Bind port. Falls back to `PORT`, then `8080`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Payment provider connection.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Server-side confirmation polling.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Merchant credentials loaded into the store at start-up.
    #[serde(default)]
    pub merchants: BTreeMap<String, MerchantSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            provider: ProviderConfig::default(),
            confirmation: ConfirmationConfig::default(),
            merchants: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Service tunables derived from this configuration.
    #[must_use]
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            currency: self.provider.currency.clone(),
            retry: RetryPolicy::new(
                Duration::from_millis(self.confirmation.interval_ms),
                self.confirmation.max_attempts,
            ),
        }
    }
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root of the provider.
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// ISO currency of preference lines.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            currency: default_currency(),
        }
    }
}

impl ProviderConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[confirmation]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Delay between polling attempts in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Attempts per polling run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// `[merchants."<id>"]` entry. Values may reference environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantSeed {
    /// Public key or `$VAR` / `${VAR}` reference.
    pub public_key: String,
    /// Secret key or `$VAR` / `${VAR}` reference.
    pub secret_key: String,
}

impl MerchantSeed {
    /// Resolves environment references into a credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a referenced variable is not set.
    pub fn resolve(&self) -> Result<PaymentCredential, Error> {
        Ok(PaymentCredential::new(
            resolve_env(&self.public_key)?,
            resolve_env(&self.secret_key)?,
        ))
    }
}

fn default_host() -> IpAddr {
    std::env::var("HOST")
        .ok()
        .and_then(|host| host.parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(8080)
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default provider URL is valid")
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_owned()
}

const fn default_interval_ms() -> u64 {
    3_000
}

const fn default_max_attempts() -> u32 {
    10
}

/// Resolve an environment-variable reference (`$VAR` or `${VAR}`), returning
/// the literal string unchanged if it does not match either pattern.
fn resolve_env(value: &str) -> Result<String, Error> {
    let var_name = if let Some(inner) = value.strip_prefix("${").and_then(|v| v.strip_suffix('}'))
    {
        Some(inner)
    } else {
        value
            .strip_prefix('$')
            .filter(|name| !name.is_empty())
            .filter(|name| name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    };
    match var_name {
        Some(name) => std::env::var(name).map_err(|_| {
            Error::config(format!(
                "env var '{name}' not found (referenced as '{value}')"
            ))
        }),
        None => Ok(value.to_owned()),
    }
}

/// Load configuration from a TOML file at the given path.
///
/// # Errors
///
/// Returns an error if the file cannot be resolved, read, or parsed.
pub fn load_config(path: &Path) -> Result<Config, Error> {
    let config_path = path.canonicalize().map_err(|e| {
        Error::config_with(format!("failed to resolve config path '{}'", path.display()), e)
    })?;
    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        Error::config_with(
            format!("failed to read config file '{}'", config_path.display()),
            e,
        )
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::config_with(
            format!("failed to parse TOML config '{}'", config_path.display()),
            e,
        )
    })
}

/// Generate a default TOML configuration template.
#[must_use]
pub fn generate_default_config() -> String {
    format!(
        r#"# Storefront payment service configuration

# Server bind address and port.
# Can also be set via HOST / PORT environment variables.
host = "0.0.0.0"
port = 8080

# ── Payment provider ────────────────────────────────────────────────
[provider]
base_url = "{DEFAULT_BASE_URL}"
timeout_secs = 30
currency = "{DEFAULT_CURRENCY}"

# ── Server-side confirmation polling ────────────────────────────────
# Used when a confirmation request asks the server to wait for a final status.
[confirmation]
interval_ms = 3000
max_attempts = 10

# ── Merchant credentials ────────────────────────────────────────────
# Optional. Merchants can also register keys through
# PUT /merchants/<id>/credentials. Values support "$VAR" or "${{VAR}}".
#
# [merchants."pizzaria-centro"]
# public_key = "$PIZZARIA_PUBLIC_KEY"
# secret_key = "$PIZZARIA_SECRET_KEY"
"#
    )
}
