//! # Backchannel configuration.
//!
//! Provides [`Config`], the settings for one [`Backchannel`](crate::Backchannel).
//!
//! ## Environment
//! [`Config::from_env`] reads:
//!
//! | variable               | field                              | default |
//! |------------------------|------------------------------------|---------|
//! | `JOB_MAX_ATTEMPTS`     | `retry.max_attempts`               | 5       |
//! | `JOB_BACKOFF_MS`       | `retry.backoff.first`              | 500     |
//! | `JOB_BACKOFF_MAX_MS`   | `retry.backoff.max`                | 30000   |
//! | `JOB_DLQ_ENABLED`      | `retry.dead_letter`                | true    |
//! | `QUEUE_CAPACITY`       | `queue_capacity`                   | 100     |
//! | `DLQ_CAPACITY`         | `dead_letter_capacity`             | 100     |
//! | `SSE_MAILBOX_CAPACITY` | `broker.mailbox_capacity`          | 16      |
//! | `SSE_KEEPALIVE_SEC`    | `broker.keepalive`                 | 25      |
//!
//! Unset or empty variables keep the default; anything unparsable is a
//! [`ConfigError`].
//!
//! ## Sentinel values
//! - `retry.backoff.max = 0` → uncapped backoff
//! - `broker.keepalive = 0s` → no `ping` frames

use std::time::Duration;

use crate::broker::BrokerConfig;
use crate::error::ConfigError;
use crate::policies::RetryPolicy;

/// Settings for one backchannel instance.
///
/// All fields are public; capacities below 1 are raised to 1 where they are used.
#[derive(Clone, Debug)]
pub struct Config {
    /// Work queue slots. A full queue makes `enqueue` wait.
    pub queue_capacity: usize,

    /// Dead-letter slots. Deposits into a full sink are dropped and counted.
    pub dead_letter_capacity: usize,

    /// Exhausted-payload reports buffered for the consumer handle.
    pub report_capacity: usize,

    /// Ring buffer of the runtime event bus.
    ///
    /// Observers lagging more than this many events skip the older ones.
    pub bus_capacity: usize,

    /// Default retry policy for [`start_consumer`](crate::Backchannel::start_consumer).
    pub retry: RetryPolicy,

    /// Subscriber mailboxes and keepalive.
    pub broker: BrokerConfig,
}

impl Default for Config {
    /// - `queue_capacity = 100`, `dead_letter_capacity = 100`, `report_capacity = 100`
    /// - `bus_capacity = 1024`
    /// - `retry = RetryPolicy::default()` (5 attempts, 500ms → 30s, dead letters on)
    /// - `broker = BrokerConfig::default()` (mailbox 16, ping every 25s)
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            dead_letter_capacity: 100,
            report_capacity: 100,
            bus_capacity: 1024,
            retry: RetryPolicy::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl Config {
    /// Loads defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overridden by whatever `lookup` returns per variable name.
    ///
    /// ```
    /// use backchannel::Config;
    ///
    /// let cfg = Config::from_lookup(|key| (key == "JOB_MAX_ATTEMPTS").then(|| "3".to_string()))
    ///     .unwrap();
    /// assert_eq!(cfg.retry.max_attempts, 3);
    /// assert_eq!(cfg.queue_capacity, 100);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty()).map(|v| (key, v));

        if let Some((k, v)) = get("JOB_MAX_ATTEMPTS") {
            cfg.retry.max_attempts = parse_num(k, &v)?;
        }
        if let Some((k, v)) = get("JOB_BACKOFF_MS") {
            cfg.retry.backoff.first = Duration::from_millis(parse_num(k, &v)?);
        }
        if let Some((k, v)) = get("JOB_BACKOFF_MAX_MS") {
            cfg.retry.backoff.max = Duration::from_millis(parse_num(k, &v)?);
        }
        if let Some((k, v)) = get("JOB_DLQ_ENABLED") {
            cfg.retry.dead_letter = parse_bool(k, &v)?;
        }
        if let Some((k, v)) = get("QUEUE_CAPACITY") {
            cfg.queue_capacity = parse_num(k, &v)?;
        }
        if let Some((k, v)) = get("DLQ_CAPACITY") {
            cfg.dead_letter_capacity = parse_num(k, &v)?;
        }
        if let Some((k, v)) = get("SSE_MAILBOX_CAPACITY") {
            cfg.broker.mailbox_capacity = parse_num(k, &v)?;
        }
        if let Some((k, v)) = get("SSE_KEEPALIVE_SEC") {
            cfg.broker.keepalive = Duration::from_secs(parse_num(k, &v)?);
        }
        Ok(cfg)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn parse_num<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected true/false or 1/0".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = load(&[]).expect("defaults");
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.dead_letter_capacity, 100);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.backoff.first, Duration::from_millis(500));
        assert_eq!(cfg.retry.backoff.max, Duration::from_secs(30));
        assert!(cfg.retry.dead_letter);
        assert_eq!(cfg.broker.mailbox_capacity, 16);
        assert_eq!(cfg.broker.ping_interval(), Some(Duration::from_secs(25)));
    }

    #[test]
    fn test_overrides() {
        let cfg = load(&[
            ("JOB_MAX_ATTEMPTS", "3"),
            ("JOB_BACKOFF_MS", "10"),
            ("JOB_BACKOFF_MAX_MS", "100"),
            ("JOB_DLQ_ENABLED", "0"),
            ("QUEUE_CAPACITY", " 2 "),
            ("SSE_KEEPALIVE_SEC", "0"),
        ])
        .expect("config");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.backoff.first, Duration::from_millis(10));
        assert_eq!(cfg.retry.backoff.max, Duration::from_millis(100));
        assert!(!cfg.retry.dead_letter);
        assert_eq!(cfg.queue_capacity, 2);
        assert_eq!(cfg.broker.ping_interval(), None);
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let cfg = load(&[("JOB_MAX_ATTEMPTS", "")]).expect("config");
        assert_eq!(cfg.retry.max_attempts, 5);
    }

    #[test]
    fn test_malformed_values() {
        let err = load(&[("JOB_MAX_ATTEMPTS", "many")]).unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
        assert!(err.to_string().contains("JOB_MAX_ATTEMPTS"));

        let err = load(&[("JOB_DLQ_ENABLED", "maybe")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "JOB_DLQ_ENABLED",
                value: "maybe".into(),
                reason: "expected true/false or 1/0".into(),
            }
        );
    }
}
