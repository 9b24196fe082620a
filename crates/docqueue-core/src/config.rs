//! Queue configuration and per-call options.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::app::RetryPolicy;

/// Top-level queue configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub get: GetConfig,
    pub index: IndexConfig,
}

/// Defaults for `Queue::get` when the caller does not override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GetConfig {
    /// How long `get` keeps polling before returning `None`.
    pub wait_ms: i64,
    /// Sleep between claim attempts.
    pub poll_ms: i64,
}

/// Index creation settings (attempts, backoff, naming).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    /// Prefix of generated index names. Keep it short: the store limits
    /// `namespace + ".$" + name`.
    pub name_prefix: String,
}

impl Default for GetConfig {
    fn default() -> Self {
        Self {
            wait_ms: 3000,
            poll_ms: 200,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            multiplier: 2.0,
            name_prefix: "dq_".to_string(),
        }
    }
}

impl IndexConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: std::time::Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Scheduling parameters of a message written by `send` / `ack_send` / `requeue`.
///
/// - `earliest_get`: `None` は「いま」（書き込み時刻）
/// - `priority`: 小さいほど先に取り出される。NaN は拒否される
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendOptions {
    pub earliest_get: Option<DateTime<Utc>>,
    pub priority: f64,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            earliest_get: None,
            priority: 0.0,
        }
    }
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message stays invisible to `get` until this instant.
    pub fn earliest_get(mut self, at: DateTime<Utc>) -> Self {
        self.earliest_get = Some(at);
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }
}

/// Parameters of one `Queue::get` call.
///
/// `wait_ms` / `poll_ms` are signed on purpose: a non-positive wait still makes
/// exactly one claim attempt, and a non-positive poll is treated as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GetOptions {
    /// How long the claim holds before the message counts as stuck.
    pub reset_duration: TimeDelta,
    pub wait_ms: i64,
    pub poll_ms: i64,
}

impl GetOptions {
    /// Options with the default wait (3000 ms) and poll (200 ms).
    pub fn new(reset_duration: TimeDelta) -> Self {
        let defaults = GetConfig::default();
        Self::from_config(reset_duration, &defaults)
    }

    pub fn from_config(reset_duration: TimeDelta, config: &GetConfig) -> Self {
        Self {
            reset_duration,
            wait_ms: config.wait_ms,
            poll_ms: config.poll_ms,
        }
    }

    /// Claim until explicitly acked or requeued.
    pub fn forever() -> Self {
        Self::new(TimeDelta::MAX)
    }

    pub fn wait_ms(mut self, wait_ms: i64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    pub fn poll_ms(mut self, poll_ms: i64) -> Self {
        self.poll_ms = poll_ms;
        self
    }
}
