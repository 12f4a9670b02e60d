//! Configuration records for the client and the server.
//!
//! Both read the same newline-delimited `key: value` format:
//!
//! ```text
//! server_ip: 127.0.0.1
//! server_port: 12345
//! maximum_msg_size: 100
//! window_size: 4
//! timeout: 2
//! dynamic_message_size: true
//! message_file: "notes.txt"
//! ```
//!
//! Lines without a `:` are ignored, keys and values are trimmed, and values
//! lose one pair of surrounding double quotes.  Values are collected into a
//! [`ConfigMap`] first so command-line flags can override file entries
//! before the record is validated.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::channel::MAX_MESSAGE;
use crate::session::FRAME_OVERHEAD;

/// Largest `maximum_msg_size` whose data frames still fit in one message.
pub const MAX_PAYLOAD_SIZE: usize = MAX_MESSAGE - FRAME_OVERHEAD;

/// Raw `key → value` pairs, later keys overriding earlier ones.
pub type ConfigMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value {value:?} for `{key}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("`{key}` must be {rule}")]
    OutOfRange { key: &'static str, rule: &'static str },
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse `key: value` lines.
pub fn parse_pairs(text: &str) -> ConfigMap {
    let mut map = ConfigMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    map
}

/// Read and parse a config file.
pub fn read_file(path: &Path) -> Result<ConfigMap, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_pairs(&text))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn lookup<'a>(map: &'a ConfigMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| map.get(*k)).map(String::as_str)
}

fn parse_num<T: std::str::FromStr>(map: &ConfigMap, key: &'static str) -> Result<Option<T>, ConfigError> {
    parse_num_alias(map, key, &[key])
}

fn parse_num_alias<T: std::str::FromStr>(
    map: &ConfigMap,
    key: &'static str,
    aliases: &[&str],
) -> Result<Option<T>, ConfigError> {
    match lookup(map, aliases) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_bool(map: &ConfigMap, key: &'static str) -> Option<bool> {
    map.get(key).map(|v| v.eq_ignore_ascii_case("true"))
}

fn parse_seconds(map: &ConfigMap, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Some(secs) = parse_num::<f64>(map, key)? else {
        return Ok(None);
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::OutOfRange {
            key,
            rule: "a positive number of seconds",
        });
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| ConfigError::OutOfRange {
            key,
            rule: "a representable number of seconds",
        })
}

fn at_least_one(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            key,
            rule: "at least 1",
        });
    }
    Ok(value)
}

fn payload_size(value: usize, key: &'static str) -> Result<usize, ConfigError> {
    if value == 0 || value > MAX_PAYLOAD_SIZE {
        return Err(ConfigError::OutOfRange {
            key,
            rule: "between 1 and 16777116 bytes",
        });
    }
    Ok(value)
}

fn warn_unknown(map: &ConfigMap, known: &[&str]) {
    for key in map.keys().filter(|k| !known.contains(&k.as_str())) {
        log::debug!("[config] ignoring unknown key `{key}`");
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Where the bytes to transfer come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSource {
    Inline(String),
    File(PathBuf),
}

/// Validated client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_ip: String,
    pub server_port: u16,
    /// Size the client would like; the server's negotiated size wins.
    pub maximum_msg_size: usize,
    pub window_size: usize,
    /// Bound on every acknowledgement read.
    pub timeout: Duration,
    pub dynamic_message_size: bool,
    pub message: MessageSource,
}

const CLIENT_KEYS: &[&str] = &[
    "server_ip",
    "server_port",
    "port",
    "maximum_msg_size",
    "window_size",
    "timeout",
    "dynamic_message_size",
    "message",
    "message_file",
];

impl ClientConfig {
    /// Build and validate a client config from raw pairs.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        warn_unknown(map, CLIENT_KEYS);

        let server_ip = map
            .get("server_ip")
            .cloned()
            .ok_or(ConfigError::Missing("server_ip"))?;
        let server_port = parse_num_alias(map, "server_port", &["server_port", "port"])?
            .ok_or(ConfigError::Missing("server_port"))?;
        let maximum_msg_size = parse_num(map, "maximum_msg_size")?
            .ok_or(ConfigError::Missing("maximum_msg_size"))?;
        let window_size =
            parse_num(map, "window_size")?.ok_or(ConfigError::Missing("window_size"))?;
        let timeout = parse_seconds(map, "timeout")?.ok_or(ConfigError::Missing("timeout"))?;

        let message = match (map.get("message_file"), map.get("message")) {
            (Some(path), _) => MessageSource::File(PathBuf::from(path)),
            (None, Some(text)) => MessageSource::Inline(text.clone()),
            (None, None) => return Err(ConfigError::Missing("message")),
        };

        Ok(Self {
            server_ip,
            server_port,
            maximum_msg_size: payload_size(maximum_msg_size, "maximum_msg_size")?,
            window_size: at_least_one(window_size, "window_size")?,
            timeout,
            dynamic_message_size: parse_bool(map, "dynamic_message_size").unwrap_or(false),
            message,
        })
    }

    /// Read the bytes to transfer.
    pub fn load_message(&self) -> Result<Vec<u8>, ConfigError> {
        match &self.message {
            MessageSource::Inline(text) => Ok(text.clone().into_bytes()),
            MessageSource::File(path) => std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Validated server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub maximum_msg_size: usize,
    pub dynamic_message_size: bool,
    /// Bound on handshake and negotiation reads.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::from([0, 0, 0, 0]),
            port: 12345,
            maximum_msg_size: 100,
            dynamic_message_size: false,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

const SERVER_KEYS: &[&str] = &[
    "bind_ip",
    "port",
    "server_port",
    "maximum_msg_size",
    "dynamic_message_size",
    "handshake_timeout",
];

impl ServerConfig {
    /// Overlay raw pairs on the defaults and validate.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        warn_unknown(map, SERVER_KEYS);
        let defaults = Self::default();

        let bind_ip = match map.get("bind_ip") {
            None => defaults.bind_ip,
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "bind_ip",
                value: raw.clone(),
            })?,
        };
        let maximum_msg_size = parse_num(map, "maximum_msg_size")?
            .unwrap_or(defaults.maximum_msg_size);

        Ok(Self {
            bind_ip,
            port: parse_num_alias(map, "port", &["port", "server_port"])?
                .unwrap_or(defaults.port),
            maximum_msg_size: payload_size(maximum_msg_size, "maximum_msg_size")?,
            dynamic_message_size: parse_bool(map, "dynamic_message_size")
                .unwrap_or(defaults.dynamic_message_size),
            handshake_timeout: parse_seconds(map, "handshake_timeout")?
                .unwrap_or(defaults.handshake_timeout),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
