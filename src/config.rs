//! Server configuration.
//!
//! Loaded from environment variables; every value has a default so the
//! server starts with an empty environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8888";

pub const DEFAULT_ICE_SERVER: &str = "stun:stun2.l.google.com:19302";

/// Grace period before an empty room is destroyed.
pub const DEFAULT_EMPTY_ROOM_GRACE_SECONDS: u64 = 30;

/// One MTU worth of RTP.
pub const DEFAULT_RTP_BUFFER_SIZE: usize = 1500;

/// Smallest packet-receive buffer accepted. Browsers cap RTP near 1200 bytes.
pub const MIN_RTP_BUFFER_SIZE: usize = 1200;

pub const DEFAULT_TRACK_CHANNEL_CAPACITY: usize = 256;

pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub const DEFAULT_LOG_FILTER: &str = "sfu_server=debug";

#[derive(Debug, Clone)]
pub struct Config {
    /// Listening endpoint for the signaling socket (default: "0.0.0.0:8888").
    pub bind_address: String,

    /// ICE server URLs handed to every media session.
    pub ice_servers: Vec<String>,

    /// How long a room may stay empty before it is destroyed.
    pub empty_room_grace: Duration,

    /// Size of the buffer each packet-receive loop reads into.
    pub rtp_buffer_size: usize,

    /// Capacity of the per-track packet channel.
    pub track_channel_capacity: usize,

    /// Messages buffered per connection before new ones are dropped.
    pub outbound_queue_capacity: usize,

    /// Tracing filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVER.to_string()],
            empty_room_grace: Duration::from_secs(DEFAULT_EMPTY_ROOM_GRACE_SECONDS),
            rtp_buffer_size: DEFAULT_RTP_BUFFER_SIZE,
            track_channel_capacity: DEFAULT_TRACK_CHANNEL_CAPACITY,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SFU_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let ice_servers = match vars.get("SFU_ICE_SERVERS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
            None => vec![DEFAULT_ICE_SERVER.to_string()],
        };

        let grace_seconds: u64 = parse_positive(
            vars,
            "SFU_EMPTY_ROOM_GRACE_SECONDS",
            DEFAULT_EMPTY_ROOM_GRACE_SECONDS,
        )?;

        let rtp_buffer_size: usize =
            parse_positive(vars, "SFU_RTP_BUFFER_SIZE", DEFAULT_RTP_BUFFER_SIZE)?;
        if rtp_buffer_size < MIN_RTP_BUFFER_SIZE {
            return Err(ConfigError::InvalidValue {
                name: "SFU_RTP_BUFFER_SIZE".to_string(),
                reason: format!("must be at least {MIN_RTP_BUFFER_SIZE}"),
            });
        }

        let track_channel_capacity = parse_positive(
            vars,
            "SFU_TRACK_CHANNEL_CAPACITY",
            DEFAULT_TRACK_CHANNEL_CAPACITY,
        )?;

        let outbound_queue_capacity = parse_positive(
            vars,
            "SFU_OUTBOUND_QUEUE_CAPACITY",
            DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        )?;

        let log_filter = vars
            .get("SFU_LOG_FILTER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            bind_address,
            ice_servers,
            empty_room_grace: Duration::from_secs(grace_seconds),
            rtp_buffer_size,
            track_channel_capacity,
            outbound_queue_capacity,
            log_filter,
        })
    }
}

fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("empty env should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.ice_servers, vec![DEFAULT_ICE_SERVER.to_string()]);
        assert_eq!(config.empty_room_grace, Duration::from_secs(30));
        assert_eq!(config.rtp_buffer_size, 1500);
        assert_eq!(config.track_channel_capacity, DEFAULT_TRACK_CHANNEL_CAPACITY);
        assert_eq!(config.outbound_queue_capacity, DEFAULT_OUTBOUND_QUEUE_CAPACITY);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("SFU_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            (
                "SFU_ICE_SERVERS".to_string(),
                "stun:a.example.org:3478, turn:b.example.org:3478,".to_string(),
            ),
            ("SFU_EMPTY_ROOM_GRACE_SECONDS".to_string(), "5".to_string()),
            ("SFU_RTP_BUFFER_SIZE".to_string(), "9000".to_string()),
            ("SFU_TRACK_CHANNEL_CAPACITY".to_string(), "16".to_string()),
            ("SFU_OUTBOUND_QUEUE_CAPACITY".to_string(), "32".to_string()),
            ("SFU_LOG_FILTER".to_string(), "sfu_server=info".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("custom env should load");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.ice_servers,
            vec![
                "stun:a.example.org:3478".to_string(),
                "turn:b.example.org:3478".to_string()
            ]
        );
        assert_eq!(config.empty_room_grace, Duration::from_secs(5));
        assert_eq!(config.rtp_buffer_size, 9000);
        assert_eq!(config.track_channel_capacity, 16);
        assert_eq!(config.outbound_queue_capacity, 32);
        assert_eq!(config.log_filter, "sfu_server=info");
    }

    #[test]
    fn test_from_vars_rejects_garbage_numbers() {
        let vars = HashMap::from([(
            "SFU_EMPTY_ROOM_GRACE_SECONDS".to_string(),
            "soon".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "SFU_EMPTY_ROOM_GRACE_SECONDS")
        );
    }

    #[test]
    fn test_from_vars_rejects_zero() {
        let vars = HashMap::from([("SFU_RTP_BUFFER_SIZE".to_string(), "0".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "SFU_RTP_BUFFER_SIZE")
        );
    }

    #[test]
    fn test_rtp_buffer_must_hold_a_full_packet() {
        let small = HashMap::from([("SFU_RTP_BUFFER_SIZE".to_string(), "512".to_string())]);
        let result = Config::from_vars(&small);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, reason }) if name == "SFU_RTP_BUFFER_SIZE" && reason.contains("1200"))
        );

        let floor = HashMap::from([("SFU_RTP_BUFFER_SIZE".to_string(), "1200".to_string())]);
        let config = Config::from_vars(&floor).expect("floor value should load");
        assert_eq!(config.rtp_buffer_size, MIN_RTP_BUFFER_SIZE);
    }

    #[test]
    fn test_outbound_queue_rejects_zero() {
        let vars = HashMap::from([("SFU_OUTBOUND_QUEUE_CAPACITY".to_string(), "0".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { name, .. }) if name == "SFU_OUTBOUND_QUEUE_CAPACITY")
        );
    }

    #[test]
    fn test_empty_ice_server_list_is_allowed() {
        let vars = HashMap::from([("SFU_ICE_SERVERS".to_string(), String::new())]);

        let config = Config::from_vars(&vars).expect("empty ice list should load");
        assert!(config.ice_servers.is_empty());
    }
}
