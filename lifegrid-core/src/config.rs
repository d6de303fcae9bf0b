//! Environment-driven configuration
//!
//! Each process reads its settings from environment variables on top of the
//! `Default` of its config struct. Loaders take a lookup function so they can
//! be exercised without touching the real environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::broker::{BrokerConfig, FailurePolicy};
use crate::controller::ControllerConfig;
use crate::error::{LifeError, Result};
use crate::worker::WorkerConfig;

/// Reads the process environment
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| LifeError::Config {
            key: key.into(),
            reason: format!("'{}': {}", raw, e),
        }),
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(lookup, key)?.map(Duration::from_millis))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some(v) => Err(LifeError::Config {
            key: key.into(),
            reason: format!("'{}' is not a boolean", v),
        }),
    }
}

/// Worker settings: `BIND_ADDR`, `MAX_MESSAGE_BYTES`, `PARALLEL_ROWS`
pub fn worker_config(lookup: impl Fn(&str) -> Option<String>) -> Result<WorkerConfig> {
    let mut config = WorkerConfig::default();
    if let Some(addr) = parse::<SocketAddr>(&lookup, "BIND_ADDR")? {
        config.bind_addr = addr;
    }
    if let Some(max) = parse(&lookup, "MAX_MESSAGE_BYTES")? {
        config.max_message_bytes = max;
    }
    if let Some(parallel) = flag(&lookup, "PARALLEL_ROWS")? {
        config.parallel_rows = parallel;
    }
    Ok(config)
}

/// Broker settings: `BIND_ADDR`, `WORKER_ADDRS`, `CONNECT_TIMEOUT_MS`,
/// `MAX_MESSAGE_BYTES`, `EVOLVE_TIMEOUT_MS`, `FAILURE_POLICY`,
/// `RETRY_BACKOFF_MS`, `PAUSE_GRACE_MS`, `QUIT_GRACE_MS`, `METRICS_ADDR`
pub fn broker_config(lookup: impl Fn(&str) -> Option<String>) -> Result<BrokerConfig> {
    let mut config = BrokerConfig::default();
    if let Some(addr) = parse::<SocketAddr>(&lookup, "BIND_ADDR")? {
        config.bind_addr = addr;
    }
    if let Some(addrs) = lookup("WORKER_ADDRS") {
        let endpoints: Vec<String> = addrs
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        if endpoints.is_empty() {
            return Err(LifeError::Config {
                key: "WORKER_ADDRS".into(),
                reason: "no worker endpoints given".into(),
            });
        }
        config.pool.endpoints = endpoints;
    }
    if let Some(timeout) = millis(&lookup, "CONNECT_TIMEOUT_MS")? {
        config.pool.connect_timeout = timeout;
    }
    if let Some(max) = parse(&lookup, "MAX_MESSAGE_BYTES")? {
        config.pool.max_message_bytes = max;
    }
    if let Some(timeout) = millis(&lookup, "EVOLVE_TIMEOUT_MS")? {
        config.dispatch.evolve_timeout = timeout;
    }
    if let Some(policy) = parse::<FailurePolicy>(&lookup, "FAILURE_POLICY")? {
        config.dispatch.policy = policy;
    }
    if let Some(backoff) = millis(&lookup, "RETRY_BACKOFF_MS")? {
        config.dispatch.retry_backoff = backoff;
    }
    if let Some(grace) = millis(&lookup, "PAUSE_GRACE_MS")? {
        config.pause_grace = grace;
    }
    if let Some(grace) = millis(&lookup, "QUIT_GRACE_MS")? {
        config.quit_grace = grace;
    }
    config.metrics_addr = parse::<SocketAddr>(&lookup, "METRICS_ADDR")?;
    Ok(config)
}

/// Controller settings: `BROKER_ADDR`, `BOARD_FILE`, `TURNS`, `POLL_INTERVAL_MS`, `OUTPUT_DIR`
pub fn controller_config(lookup: impl Fn(&str) -> Option<String>) -> Result<ControllerConfig> {
    let mut config = ControllerConfig::default();
    if let Some(addr) = lookup("BROKER_ADDR") {
        config.broker_addr = addr;
    }
    config.board_file = lookup("BOARD_FILE").map(PathBuf::from);
    if let Some(turns) = parse(&lookup, "TURNS")? {
        config.turns = turns;
    }
    if let Some(interval) = millis(&lookup, "POLL_INTERVAL_MS")? {
        config.poll_interval = interval;
    }
    config.output_dir = lookup("OUTPUT_DIR").map(PathBuf::from);
    Ok(config)
}
