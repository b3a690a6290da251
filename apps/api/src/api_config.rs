use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use storefront_core::AppError;
use storefront_domain::{DEFAULT_POLICY_TABLE, Policy};
use tracing_subscriber::EnvFilter;

const DEFAULT_KEY_PREFIX: &str = "storefront:admission";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 100;

/// Backing store selected for admission counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterStoreConfig {
    Redis { redis_url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub counter_store: CounterStoreConfig,
    pub key_prefix: String,
    pub store_timeout: Duration,
    pub trusted_proxies: Vec<IpNet>,
    pub policies: Vec<Policy>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = lookup("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3002);

        let counter_store = match lookup("ADMISSION_STORE")
            .unwrap_or_else(|| "redis".to_owned())
            .trim()
        {
            "redis" => CounterStoreConfig::Redis {
                redis_url: required_non_empty(&lookup, "REDIS_URL")?,
            },
            "memory" => CounterStoreConfig::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "ADMISSION_STORE must be either 'redis' or 'memory', got '{other}'"
                )));
            }
        };

        let key_prefix = lookup("ADMISSION_KEY_PREFIX")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_owned());

        let store_timeout_ms = match lookup("ADMISSION_STORE_TIMEOUT_MS") {
            Some(value) => parse_positive::<u64>("ADMISSION_STORE_TIMEOUT_MS", value.as_str())?,
            None => DEFAULT_STORE_TIMEOUT_MS,
        };

        let trusted_proxies = lookup("ADMISSION_TRUSTED_PROXIES")
            .map(|value| parse_trusted_proxies(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        let policies = DEFAULT_POLICY_TABLE
            .iter()
            .map(|(name, quota, window_seconds, penalty_seconds)| {
                let prefix = policy_env_prefix(name);
                Policy::new(
                    *name,
                    policy_setting(&lookup, &prefix, "QUOTA", *quota)?,
                    policy_setting(&lookup, &prefix, "WINDOW_SECONDS", *window_seconds)?,
                    policy_setting(&lookup, &prefix, "PENALTY_SECONDS", *penalty_seconds)?,
                )
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self {
            api_host,
            api_port,
            counter_store,
            key_prefix,
            store_timeout: Duration::from_millis(store_timeout_ms),
            trusted_proxies,
            policies,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Maps a policy name to its environment prefix, e.g. `phoneVerify` to
/// `RATE_LIMIT_PHONE_VERIFY`.
fn policy_env_prefix(policy_name: &str) -> String {
    let mut prefix = String::from("RATE_LIMIT_");
    for (index, character) in policy_name.chars().enumerate() {
        if character.is_ascii_uppercase() && index > 0 {
            prefix.push('_');
        }
        prefix.push(character.to_ascii_uppercase());
    }

    prefix
}

fn policy_setting(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    setting: &str,
    default: u32,
) -> Result<u32, AppError> {
    let name = format!("{prefix}_{setting}");
    match lookup(name.as_str()) {
        Some(value) => parse_positive::<u32>(name.as_str(), value.as_str()),
        None => Ok(default),
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))?;
    if parsed == T::default() {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(parsed)
}

fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|error| {
                    AppError::Validation(format!(
                        "invalid ADMISSION_TRUSTED_PROXIES entry '{entry}': {error}"
                    ))
                })
        })
        .collect()
}

fn required_non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String, AppError> {
    let value = lookup(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}
