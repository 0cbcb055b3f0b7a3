//! Server configuration.
//!
//! The YAML file maps directly onto [`dlnabridge_core::Config`]; every key is
//! optional. Environment variables override the file, and CLI flags (applied
//! in `main`) override both.

use std::path::Path;

use anyhow::{Context, Result};
use dlnabridge_core::{Config, UpstreamConfig};

/// Loads configuration from a YAML file, then applies environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `DLNABRIDGE_*` overrides read through `var`.
///
/// Unparseable values are ignored with a warning. An upstream server is
/// only created from the environment when both URL and user id are known.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("DLNABRIDGE_PORT") {
        match val.parse() {
            Ok(port) => config.http_port = port,
            Err(_) => log::warn!("Ignoring invalid DLNABRIDGE_PORT: {}", val),
        }
    }

    if let Some(val) = var("DLNABRIDGE_ADVERTISE_IP") {
        match val.parse() {
            Ok(ip) => config.advertise_ip = Some(ip),
            Err(_) => log::warn!("Ignoring invalid DLNABRIDGE_ADVERTISE_IP: {}", val),
        }
    }

    if let Some(val) = var("DLNABRIDGE_FRIENDLY_NAME") {
        config.friendly_name = Some(val);
    }

    let server_url = var("DLNABRIDGE_SERVER_URL");
    let user_id = var("DLNABRIDGE_USER_ID");
    let token = var("DLNABRIDGE_TOKEN");

    match config.upstream.as_mut() {
        Some(upstream) => {
            if let Some(url) = server_url {
                upstream.server_url = url;
            }
            if let Some(user) = user_id {
                upstream.user_id = user;
            }
            if token.is_some() {
                upstream.access_token = token;
            }
        }
        None => {
            if let (Some(server_url), Some(user_id)) = (server_url, user_id) {
                config.upstream = Some(UpstreamConfig {
                    server_url,
                    user_id,
                    access_token: token,
                });
            }
        }
    }
}
