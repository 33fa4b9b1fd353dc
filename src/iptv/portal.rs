//! Stalker portal session handling (spec §4.9 `StalkerPortalClient`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::IptvConfig;
use crate::iptv::error::IptvError;

const TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(2 * 60);
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5 * 60);
const HLS_LINK_TTL: Duration = Duration::from_secs(30);
const MEDIA_LINK_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Hls,
    Media,
}

struct TokenState {
    token: String,
    expires_at: Instant,
}

pub struct StalkerPortalClient {
    http: Client,
    config: IptvConfig,
    token: RwLock<Option<TokenState>>,
    active_streams: AtomicUsize,
    hls_links: Cache<String, String>,
    media_links: Cache<String, String>,
    ffmpeg_heuristic: bool,
}

impl StalkerPortalClient {
    pub fn new(config: IptvConfig) -> Self {
        Self::with_ffmpeg_heuristic(config, true)
    }

    /// Like [`Self::new`], but lets the caller disable the `ffmpeg …`
    /// command synthesis in [`Self::create_link`]. That synthesis is an
    /// observed portal quirk rather than documented protocol (spec §9),
    /// so it's made switchable instead of assumed universal.
    pub fn with_ffmpeg_heuristic(config: IptvConfig, ffmpeg_heuristic: bool) -> Self {
        Self {
            http: Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .timeout(Duration::from_secs(20))
                .build()
                .expect("reqwest client builds with default TLS backend"),
            config,
            token: RwLock::new(None),
            active_streams: AtomicUsize::new(0),
            hls_links: Cache::builder().time_to_live(HLS_LINK_TTL).build(),
            media_links: Cache::builder().time_to_live(MEDIA_LINK_TTL).build(),
            ffmpeg_heuristic,
        }
    }

    async fn ensure_token(&self) -> Result<String, IptvError> {
        {
            let guard = self.token.read().await;
            if let Some(state) = guard.as_ref() {
                if Instant::now() + TOKEN_REFRESH_MARGIN < state.expires_at {
                    return Ok(state.token.clone());
                }
            }
        }
        self.handshake().await
    }

    async fn handshake(&self) -> Result<String, IptvError> {
        let url = format!(
            "{}/portal.php?type=stb&action=handshake&JsHttpRequest=1-xml",
            self.config.portal_url.trim_end_matches('/')
        );
        let mac_cookie = utf8_percent_encode(&self.config.mac, NON_ALPHANUMERIC).to_string();
        let response = self
            .http
            .get(&url)
            .header("User-Agent", &self.config.stb_user_agent)
            .header("X-User-Agent", "Model: MAG250; Link: WiFi")
            .header("Cookie", format!("mac={mac_cookie}; timezone=UTC; stb_lang=en"))
            .send()
            .await?;
        let body: Value = response.json().await?;
        let token = body
            .get("js")
            .and_then(|js| js.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| IptvError::Portal("handshake response missing js.token".into()))?
            .to_string();

        *self.token.write().await = Some(TokenState {
            token: token.clone(),
            expires_at: Instant::now() + TOKEN_LIFETIME,
        });
        Ok(token)
    }

    /// Parses a stream-launch command into the reference form
    /// `http://localhost/ch/<channelId>`, accepting either the reference
    /// form directly or the ffmpeg-style `ffmpeg http(s)://...stream=<N>...`
    /// variant some panels emit.
    pub async fn create_link(&self, cmd: &str, kind: StreamKind) -> Result<String, IptvError> {
        let cache = match kind {
            StreamKind::Hls => &self.hls_links,
            StreamKind::Media => &self.media_links,
        };
        if let Some(cached) = cache.get(cmd).await {
            return Ok(cached);
        }
        let link = parse_stream_command(cmd, self.ffmpeg_heuristic)?;
        cache.insert(cmd.to_string(), link.clone()).await;
        Ok(link)
    }

    /// Marks a stream as live; starts the watchdog if this is the first
    /// active stream on the account.
    pub fn stream_started(self: &Arc<Self>) {
        if self.active_streams.fetch_add(1, Ordering::SeqCst) == 0 {
            self.spawn_watchdog();
        }
    }

    pub fn stream_stopped(&self) {
        self.active_streams.fetch_sub(1, Ordering::SeqCst);
    }

    fn spawn_watchdog(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
            loop {
                interval.tick().await;
                if this.active_streams.load(Ordering::SeqCst) == 0 {
                    debug!("iptv watchdog stopping, no active streams");
                    break;
                }
                if let Err(err) = this.send_watchdog().await {
                    warn!(error = %err, "iptv watchdog failed, clearing token");
                    *this.token.write().await = None;
                }
            }
        });
    }

    async fn send_watchdog(&self) -> Result<(), IptvError> {
        let token = self.ensure_token().await?;
        let url = format!(
            "{}/portal.php?action=get_events&type=watchdog&event_active_id=0&JsHttpRequest=1-xml",
            self.config.portal_url.trim_end_matches('/')
        );
        self.http
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", &self.config.stb_user_agent)
            .send()
            .await?;
        Ok(())
    }
}

fn parse_stream_command(cmd: &str, ffmpeg_heuristic: bool) -> Result<String, IptvError> {
    if let Some(rest) = cmd.strip_prefix("ffrt ") {
        return Ok(rest.trim().to_string());
    }
    if ffmpeg_heuristic {
        if let Some(rest) = cmd.strip_prefix("ffmpeg ") {
            if let Some(idx) = rest.find("stream=") {
                let digits: String = rest[idx + "stream=".len()..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if !digits.is_empty() {
                    return Ok(format!("http://localhost/ch/{digits}"));
                }
            }
        }
    }
    Err(IptvError::InvalidCommand(cmd.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reference_form_directly() {
        assert_eq!(
            parse_stream_command("ffrt http://localhost/ch/42", true).unwrap(),
            "http://localhost/ch/42"
        );
    }

    #[test]
    fn synthesises_reference_form_from_ffmpeg_command() {
        let cmd = "ffmpeg http://vod.example.com/play?stream=1337&token=x";
        assert_eq!(parse_stream_command(cmd, true).unwrap(), "http://localhost/ch/1337");
    }

    #[test]
    fn ffmpeg_synthesis_disabled_by_the_heuristic_flag() {
        let cmd = "ffmpeg http://vod.example.com/play?stream=1337&token=x";
        assert!(parse_stream_command(cmd, false).is_err());
    }

    #[test]
    fn rejects_unrecognised_command() {
        assert!(parse_stream_command("unknown command", true).is_err());
    }

    fn test_config(portal_url: String) -> IptvConfig {
        IptvConfig {
            portal_url,
            mac: "00:1A:79:AA:BB:CC".to_string(),
            stb_user_agent: "test-agent".to_string(),
        }
    }

    #[tokio::test]
    async fn handshake_extracts_token_and_caches_it() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/portal\.php.*action=handshake.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"js": {"token": "abc123"}}"#)
            .create_async()
            .await;

        let client = StalkerPortalClient::new(test_config(server.url()));
        let token = client.handshake().await.unwrap();
        assert_eq!(token, "abc123");

        // ensure_token should now reuse the cached token without re-handshaking.
        let reused = client.ensure_token().await.unwrap();
        assert_eq!(reused, "abc123");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn handshake_missing_token_is_a_portal_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/portal\.php.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"js": {}}"#)
            .create_async()
            .await;

        let client = StalkerPortalClient::new(test_config(server.url()));
        assert!(client.handshake().await.is_err());
    }
}
