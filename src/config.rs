use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Endpoint description for one broker. For the wx side `topic` is a
/// subscribe filter; for the allsky side it is the publish-topic prefix.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub wx: BrokerConfig,
    pub allsky: BrokerConfig,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    allsky_host: String,
    allsky_port: u16,
    allsky_client_id: String,
    #[serde(default)]
    allsky_username: String,
    #[serde(default)]
    allsky_password: String,
    allsky_topic: String,

    wx_host: String,
    wx_port: u16,
    wx_client_id: String,
    #[serde(default)]
    wx_username: String,
    #[serde(default)]
    wx_password: String,
    wx_topic: String,
}

impl Config {
    /// Loads and validates the config file. Any problem here is startup-fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse config file {}", path.display()))?;

        let wx = broker_config(
            "wx",
            file.wx_host,
            file.wx_port,
            file.wx_client_id,
            file.wx_username,
            file.wx_password,
            file.wx_topic,
        )?;
        let allsky = broker_config(
            "allsky",
            file.allsky_host,
            file.allsky_port,
            file.allsky_client_id,
            file.allsky_username,
            file.allsky_password,
            file.allsky_topic,
        )?;

        Ok(Self { wx, allsky })
    }
}

fn broker_config(
    name: &str,
    host: String,
    port: u16,
    client_id: String,
    username: String,
    password: String,
    topic: String,
) -> Result<BrokerConfig> {
    if host.trim().is_empty() {
        bail!("{name}_host must not be empty");
    }
    if port == 0 {
        bail!("{name}_port must be between 1 and 65535");
    }
    if client_id.trim().is_empty() {
        bail!("{name}_client_id must not be empty");
    }
    if topic.trim().is_empty() {
        bail!("{name}_topic must not be empty");
    }

    Ok(BrokerConfig {
        host,
        port,
        client_id,
        username: optional(username),
        password: optional(password),
        topic,
    })
}

// An empty or whitespace-only username/password means "connect unauthenticated".
fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
