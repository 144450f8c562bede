use anyhow::{Context, Result};
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Pipeline configuration, loaded once at startup. Anything invalid here is
/// fatal: `initialize()` must never start loops against a half-configured
/// environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Websocket RPC endpoint for the single supported chain.
    pub wss_url: String,
    /// Known factory contracts whose calls qualify a transaction for
    /// mint-log inspection.
    pub factory_addresses: Vec<Address>,

    // Discovery loop
    pub sweep_interval: Duration,
    pub max_sweep_span: u64,

    // Price scheduler
    pub pass_interval: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,

    // Outbound calls
    pub http_timeout: Duration,

    // Price sources
    pub dex_api_url: String,
    pub market_api_url: Option<String>,
    pub keyed_provider_url: Option<String>,
    pub keyed_provider_api_key: Option<String>,

    /// Market cap below this (in quote currency) never sets
    /// `has_valid_market_cap`, even from the primary source.
    pub min_liquidity_floor: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wss_url: String::new(),
            factory_addresses: Vec::new(),
            sweep_interval: Duration::from_secs(30),
            max_sweep_span: 25,
            pass_interval: Duration::from_secs(120),
            batch_size: 5,
            batch_delay: Duration::from_secs(1),
            http_timeout: Duration::from_secs(10),
            dex_api_url: "https://api.dexscreener.com".to_string(),
            market_api_url: Some("https://api.coingecko.com".to_string()),
            keyed_provider_url: None,
            keyed_provider_api_key: None,
            min_liquidity_floor: 1000.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let wss_url = std::env::var("TOKENPIPE_WSS_URL")
            .map_err(|_| ConfigError::MissingVar("TOKENPIPE_WSS_URL"))?;

        let factory_addresses = match std::env::var("TOKENPIPE_FACTORY_ADDRESSES") {
            Ok(raw) => parse_address_list(&raw)?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            wss_url,
            factory_addresses,
            sweep_interval: env_duration_secs("TOKENPIPE_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            max_sweep_span: env_parse("TOKENPIPE_MAX_SWEEP_SPAN", defaults.max_sweep_span)?,
            pass_interval: env_duration_secs("TOKENPIPE_PASS_INTERVAL_SECS", defaults.pass_interval)?,
            batch_size: env_parse("TOKENPIPE_BATCH_SIZE", defaults.batch_size)?,
            batch_delay: env_duration_secs("TOKENPIPE_BATCH_DELAY_SECS", defaults.batch_delay)?,
            http_timeout: env_duration_secs("TOKENPIPE_HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            dex_api_url: std::env::var("TOKENPIPE_DEX_API_URL").unwrap_or(defaults.dex_api_url),
            market_api_url: std::env::var("TOKENPIPE_MARKET_API_URL")
                .ok()
                .or(defaults.market_api_url),
            keyed_provider_url: std::env::var("TOKENPIPE_KEYED_PROVIDER_URL").ok(),
            keyed_provider_api_key: std::env::var("TOKENPIPE_KEYED_PROVIDER_API_KEY").ok(),
            min_liquidity_floor: env_parse("TOKENPIPE_MIN_LIQUIDITY_FLOOR", defaults.min_liquidity_floor)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        validate_rpc_url("TOKENPIPE_WSS_URL", &self.wss_url)?;
        validate_http_url("TOKENPIPE_DEX_API_URL", &self.dex_api_url)?;
        if let Some(url) = &self.market_api_url {
            validate_http_url("TOKENPIPE_MARKET_API_URL", url)?;
        }
        if let Some(url) = &self.keyed_provider_url {
            validate_http_url("TOKENPIPE_KEYED_PROVIDER_URL", url)?;
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "TOKENPIPE_BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.max_sweep_span == 0 {
            return Err(ConfigError::InvalidValue {
                var: "TOKENPIPE_MAX_SWEEP_SPAN",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.pass_interval.is_zero() || self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "TOKENPIPE_PASS_INTERVAL_SECS",
                reason: "intervals must be non-zero".to_string(),
            }
            .into());
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                var: "TOKENPIPE_HTTP_TIMEOUT_SECS",
                reason: "outbound calls require a bounded timeout".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// True when the tertiary source is fully configured; it is skipped
    /// entirely otherwise.
    pub fn keyed_provider_enabled(&self) -> bool {
        self.keyed_provider_url.is_some() && self.keyed_provider_api_key.is_some()
    }
}

fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::from_str(s).map_err(|e| {
                anyhow::Error::new(ConfigError::InvalidValue {
                    var: "TOKENPIPE_FACTORY_ADDRESSES",
                    reason: format!("{}: {}", s, e),
                })
            })
        })
        .collect()
}

fn env_parse<T: FromStr>(var: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|e| {
            ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(var: &'static str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(env_parse(
        var,
        default.as_secs(),
    )?))
}

fn validate_rpc_url(var: &'static str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("{} is not a URL", var))?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            var,
            reason: format!("unsupported scheme {}", other),
        }
        .into()),
    }
}

fn validate_http_url(var: &'static str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).with_context(|| format!("{} is not a URL", var))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            var,
            reason: format!("unsupported scheme {}", other),
        }
        .into()),
    }
}
