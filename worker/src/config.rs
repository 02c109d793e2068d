// ==============================================================================
// config.rs - Worker Configuration
// ==============================================================================
// Description: Environment-provided configuration for the worker process
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================
// Host method names live here rather than in the client: hosts expose the
// same two operations under different names, so they are configuration.
// Unknown environment variables are ignored.
// ==============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that make the configuration unusable at start-up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Analysis contract address, normalized to lower-case 0x hex
    pub contract_address: String,
    /// Host runtime Unix-domain socket
    pub host_socket_path: PathBuf,
    /// Poll period for the pending set
    pub poll_interval: Duration,
    /// Maximum concurrently processed requests
    pub max_parallel: usize,
    /// Retry budget per host operation within one request
    pub retry_max: u32,
    /// Base delay for per-operation retry backoff
    pub retry_backoff_base: Duration,
    /// Deadline for the full fetch+analyze+submit of one request
    pub request_deadline: Duration,
    /// Deadline for a single host call
    pub host_call_timeout: Duration,
    /// Maximum accepted host response size in bytes
    pub host_max_payload: usize,
    /// Host method name for authenticated read-only calls
    pub host_call_method: String,
    /// Host method name for authenticated signed transactions
    pub host_submit_method: String,
    /// Gas limit attached to signed transactions
    pub gas_limit: u64,
    /// Grace period for in-flight work at shutdown
    pub shutdown_grace: Duration,
    /// Bind address for the local status API
    pub status_api_addr: SocketAddr,
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup (testable without
    /// mutating the process environment)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let contract_address = normalize_address(
            &lookup("CONTRACT_ADDRESS").ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))?,
        )?;

        let host_socket_path = PathBuf::from(
            lookup("HOST_SOCKET_PATH").unwrap_or_else(|| "/run/rofl-appd.sock".to_string()),
        );

        let poll_interval = Duration::from_secs(parse_or(
            &lookup,
            "POLL_INTERVAL_SECONDS",
            30u64,
        )?);
        let max_parallel = parse_or(&lookup, "MAX_PARALLEL", 2usize)?;
        let retry_max = parse_or(&lookup, "RETRY_MAX", 3u32)?;
        let retry_backoff_base =
            Duration::from_millis(parse_or(&lookup, "RETRY_BACKOFF_BASE_MS", 500u64)?);
        let request_deadline =
            Duration::from_secs(parse_or(&lookup, "REQUEST_DEADLINE_SECONDS", 120u64)?);
        let host_call_timeout =
            Duration::from_secs(parse_or(&lookup, "HOST_CALL_TIMEOUT_SECONDS", 30u64)?);
        let host_max_payload = parse_or(&lookup, "HOST_MAX_PAYLOAD_BYTES", 1024usize * 1024)?;
        let gas_limit = parse_or(&lookup, "GAS_LIMIT", 800_000u64)?;
        let shutdown_grace =
            Duration::from_secs(parse_or(&lookup, "SHUTDOWN_GRACE_SECONDS", 60u64)?);

        let host_call_method =
            lookup("HOST_CALL_METHOD").unwrap_or_else(|| "eth_call".to_string());
        let host_submit_method =
            lookup("HOST_SUBMIT_METHOD").unwrap_or_else(|| "tx.sign-submit".to_string());

        let status_api_raw =
            lookup("STATUS_API_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let status_api_addr =
            status_api_raw
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::Invalid {
                    var: "STATUS_API_ADDR",
                    value: status_api_raw.clone(),
                    reason: e.to_string(),
                })?;

        if max_parallel == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_PARALLEL",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            contract_address,
            host_socket_path,
            poll_interval,
            max_parallel,
            retry_max,
            retry_backoff_base,
            request_deadline,
            host_call_timeout,
            host_max_payload,
            host_call_method,
            host_submit_method,
            gas_limit,
            shutdown_grace,
            status_api_addr,
        })
    }
}

/// Parse a numeric variable, falling back to a default when unset
fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

/// Validate and normalize a contract address to lower-case 0x hex
fn normalize_address(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "CONTRACT_ADDRESS",
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    if hex_part.len() != 40 {
        return Err(invalid("expected 20 bytes of hex"));
    }
    hex::decode(hex_part).map_err(|_| invalid("not valid hex"))?;
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}
