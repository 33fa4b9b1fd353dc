use derive_more::Constructor;
use serde::Deserialize;

/// One configured Usenet provider (spec §3 `NntpServerConfig`, §6.7
/// `NntpServerSettings`). Providers are tried in ascending `priority`
/// order (lower = higher priority) by [`crate::nntp::NntpClientManager`].
#[derive(Debug, Clone, Deserialize, Constructor)]
pub struct NntpServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub priority: u32,
}

fn default_max_connections() -> usize {
    10
}

impl NntpServerConfig {
    pub fn requires_auth(&self) -> bool {
        self.username.is_some()
    }
}
