//! Configuration module for the TradeFlow pipeline.
//!
//! Configuration is loaded from TOML files. `${VAR}` and `${VAR:-default}`
//! placeholders are resolved from the environment before parsing, and the
//! parsed configuration is validated so wiring failures surface at startup
//! rather than at first use.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep just the message, not the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration for the pipeline instance itself.
	pub pipeline: PipelineConfig,
	/// Configuration for the order store backend.
	pub store: StoreConfig,
	/// Configuration for the read cache.
	pub cache: CacheConfig,
	/// Configuration for the event log.
	pub events: EventsConfig,
	/// Configuration for the settlement worker.
	#[serde(default)]
	pub settlement: SettlementConfig,
}

/// Configuration for the pipeline instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	/// Identifier for this pipeline instance.
	pub id: String,
	/// Bound, in seconds, applied to every store/cache/event-log call.
	#[serde(default = "default_op_timeout_secs")]
	pub op_timeout_secs: u64,
}

impl PipelineConfig {
	/// The per-call timeout as a `Duration`.
	pub fn op_timeout(&self) -> Duration {
		Duration::from_secs(self.op_timeout_secs)
	}
}

fn default_op_timeout_secs() -> u64 {
	5
}

/// Configuration for the order store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of store implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the read cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Time-to-live, in seconds, for cached snapshots.
	#[serde(default = "default_cache_ttl_secs")]
	pub ttl_secs: u64,
	/// Interval, in seconds, between sweeps of expired entries.
	#[serde(default = "default_cleanup_interval_secs")]
	pub cleanup_interval_secs: u64,
	/// Map of cache implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl CacheConfig {
	/// Snapshot time-to-live as a `Duration`.
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_secs)
	}

	/// Sweep interval as a `Duration`.
	pub fn cleanup_interval(&self) -> Duration {
		Duration::from_secs(self.cleanup_interval_secs)
	}
}

fn default_cache_ttl_secs() -> u64 {
	60
}

fn default_cleanup_interval_secs() -> u64 {
	30
}

/// Configuration for the event log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Topic that order lifecycle events are published to.
	#[serde(default = "default_topic")]
	pub topic: String,
	/// Map of event-log implementation names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

fn default_topic() -> String {
	"order.events".to_string()
}

/// Configuration for the settlement worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	/// Consumer group the worker subscribes under.
	#[serde(default = "default_group")]
	pub group: String,
	/// Simulated settlement latency, in milliseconds.
	#[serde(default = "default_settle_delay_ms")]
	pub settle_delay_ms: u64,
}

impl SettlementConfig {
	/// Settlement latency as a `Duration`.
	pub fn settle_delay(&self) -> Duration {
		Duration::from_millis(self.settle_delay_ms)
	}
}

impl Default for SettlementConfig {
	fn default() -> Self {
		Self {
			group: default_group(),
			settle_delay_ms: default_settle_delay_ms(),
		}
	}
}

fn default_group() -> String {
	"matching-engine".to_string()
}

fn default_settle_delay_ms() -> u64 {
	3000
}

/// Resolves environment variables in a configuration string.
///
/// `${VAR}` is replaced with the value of `VAR`; `${VAR:-default}` falls
/// back to `default` when `VAR` is unset. Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let placeholder = cap.get(0).expect("capture 0 always present");
		let var_name = &cap[1];

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		result.push_str(&input[last_end..placeholder.start()]);
		result.push_str(&value);
		last_end = placeholder.end();
	}

	result.push_str(&input[last_end..]);
	Ok(result)
}

impl Config {
	/// Loads configuration from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;
		raw.parse()
	}

	/// Validates the configuration so misconfiguration fails at startup.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.pipeline.id.is_empty() {
			return Err(ConfigError::Validation("Pipeline id cannot be empty".into()));
		}
		if self.pipeline.op_timeout_secs == 0 {
			return Err(ConfigError::Validation(
				"pipeline.op_timeout_secs must be greater than 0".into(),
			));
		}

		Self::validate_primary("store", &self.store.primary, &self.store.implementations)?;
		Self::validate_primary("cache", &self.cache.primary, &self.cache.implementations)?;
		Self::validate_primary("events", &self.events.primary, &self.events.implementations)?;

		if self.cache.ttl_secs == 0 {
			return Err(ConfigError::Validation(
				"cache.ttl_secs must be greater than 0".into(),
			));
		}
		if self.cache.cleanup_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"cache.cleanup_interval_secs must be greater than 0".into(),
			));
		}
		if self.cache.cleanup_interval_secs > 86400 {
			return Err(ConfigError::Validation(
				"cache.cleanup_interval_secs cannot exceed 86400 (24 hours)".into(),
			));
		}

		if self.events.topic.is_empty() {
			return Err(ConfigError::Validation("events.topic cannot be empty".into()));
		}
		if self.settlement.group.is_empty() {
			return Err(ConfigError::Validation(
				"settlement.group cannot be empty".into(),
			));
		}

		Ok(())
	}

	fn validate_primary(
		section: &str,
		primary: &str,
		implementations: &HashMap<String, toml::Value>,
	) -> Result<(), ConfigError> {
		if primary.is_empty() {
			return Err(ConfigError::Validation(format!(
				"{} primary implementation cannot be empty",
				section
			)));
		}
		if !implementations.contains_key(primary) {
			return Err(ConfigError::Validation(format!(
				"Primary {} implementation '{}' not found in implementations",
				section, primary
			)));
		}
		Ok(())
	}
}

/// Parses configuration from a TOML string, resolving environment variables
/// and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
