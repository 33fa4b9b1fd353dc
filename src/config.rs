use config::{Config, Environment};
use serde::Deserialize;

use crate::nntp::config::NntpServerConfig;

/// Top-level application configuration, assembled from the environment
/// (`.env` is loaded first via `dotenvy`, then real env vars override it).
///
/// NNTP providers are configured as `NNTP_SERVERS` entries, one per
/// provider, e.g. `NNTP_SERVERS_0_HOST=news.example.com`. `config`'s
/// `Environment` source understands the `N_N` index convention when the
/// list separator is unset, so we parse providers out by hand instead to
/// keep the shape obvious (see `AppConfig::from_env`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub iptv: Option<IptvConfig>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IptvConfig {
    pub portal_url: String,
    pub mac: String,
    #[serde(default = "default_stb_user_agent")]
    pub stb_user_agent: String,
}

fn default_stb_user_agent() -> String {
    "Mozilla/5.0 (QtEmbedded; U; Linux; C) AppleWebKit/533.3".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let config: AppConfig = Config::builder()
            .set_default("bind_addr", default_bind_addr())?
            .add_source(Environment::with_prefix("APP").separator("_"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Providers are read directly from `NNTP_SERVER_<N>_*` env vars rather
    /// than through `config::Environment`'s array handling, so that the
    /// ordered-by-priority contract in spec §4.4 is explicit rather than
    /// dependent on deserialization order.
    pub fn nntp_servers_from_env() -> Vec<NntpServerConfig> {
        let mut servers = Vec::new();
        let mut index = 0usize;

        loop {
            let prefix = format!("NNTP_SERVER_{index}_");
            let host = match std::env::var(format!("{prefix}HOST")) {
                Ok(h) => h,
                Err(_) => break,
            };

            let port: u16 = std::env::var(format!("{prefix}PORT"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(119);
            let use_ssl = std::env::var(format!("{prefix}SSL"))
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            let username = std::env::var(format!("{prefix}USERNAME")).ok();
            let password = std::env::var(format!("{prefix}PASSWORD")).ok();
            let max_connections = std::env::var(format!("{prefix}MAX_CONNECTIONS"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);
            let priority = std::env::var(format!("{prefix}PRIORITY"))
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(index as u32);

            servers.push(NntpServerConfig {
                name: format!("provider-{index}"),
                host,
                port,
                use_ssl,
                username,
                password,
                max_connections,
                priority,
            });

            index += 1;
        }

        servers.sort_by_key(|s| s.priority);
        servers
    }
}
