//! Upstream fetch with manual redirects, retry, and stream-type detection
//! (spec §4.9 `HttpStreamService`).

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{Client, Response, Url};

use crate::iptv::error::IptvError;
use crate::iptv::manifest::HlsManifestRewriter;

const MAX_REDIRECTS: u8 = 10;

const HLS_CONTENT_TYPES: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
];

pub enum UpstreamResponse {
    Hls { body: String, content_type: String },
    Media { response: Response },
}

pub struct HttpStreamService {
    http: Client,
    stb_user_agent: String,
}

impl HttpStreamService {
    pub fn new(stb_user_agent: String) -> Self {
        Self {
            http: Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .timeout(Duration::from_secs(20))
                .build()
                .expect("reqwest client builds with default TLS backend"),
            stb_user_agent,
        }
    }

    /// Fetches `url`, rewriting it if it turns out to be an HLS manifest.
    /// Also returns the response's final (post-redirect) URL, which the
    /// caller stores as the channel's HLS root for resolving later
    /// relative segment/sub-manifest requests.
    pub async fn fetch(&self, url: &str, proxy_prefix: &str) -> Result<(UpstreamResponse, Url), IptvError> {
        let response = self.fetch_with_retries(url).await?;
        let base = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_hls_content_type(&content_type) {
            let body = response.text().await?;
            let rewritten = HlsManifestRewriter::rewrite(&body, &base, proxy_prefix);
            Ok((UpstreamResponse::Hls { body: rewritten, content_type }, base))
        } else {
            Ok((UpstreamResponse::Media { response }, base))
        }
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<Response, IptvError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(10))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(7)))
            .build();

        backoff::future::retry(policy, || async {
            self.fetch_following_redirects(url).await.map_err(classify_retry)
        })
        .await
    }

    async fn fetch_following_redirects(&self, url: &str) -> Result<Response, IptvError> {
        let mut current: String = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            let response = self
                .http
                .get(&current)
                .header(USER_AGENT, &self.stb_user_agent)
                .send()
                .await?;

            if response.status().is_redirection() {
                if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    current = resolve_redirect(&current, location)?;
                    continue;
                }
            }
            return Ok(response);
        }
        Err(IptvError::TooManyRedirects(MAX_REDIRECTS))
    }
}

fn resolve_redirect(current: &str, location: &str) -> Result<String, IptvError> {
    match Url::parse(location) {
        Ok(absolute) => Ok(absolute.to_string()),
        Err(_) => {
            let base = Url::parse(current).map_err(|_| IptvError::Portal("invalid upstream URL".into()))?;
            base.join(location)
                .map(|u| u.to_string())
                .map_err(|_| IptvError::Portal("invalid redirect location".into()))
        }
    }
}

/// Resolves a path component received on the segment-dispatch route: a
/// URL-encoded absolute URL is decoded and fetched as-is, anything else is
/// resolved against the stored HLS root for that channel.
pub fn resolve_segment_target(path: &str, root: Option<&Url>) -> Result<String, IptvError> {
    let decoded = percent_decode_str(path).decode_utf8_lossy().to_string();
    if let Ok(absolute) = Url::parse(&decoded) {
        return Ok(absolute.to_string());
    }
    let root = root.ok_or_else(|| IptvError::ManifestError("no HLS root cached for channel yet".into()))?;
    root.join(path)
        .map(|u| u.to_string())
        .map_err(|_| IptvError::ManifestError(format!("cannot resolve segment path '{path}'")))
}

fn is_hls_content_type(content_type: &str) -> bool {
    let normalized = content_type.split(';').next().unwrap_or("").trim();
    HLS_CONTENT_TYPES.iter().any(|ct| ct.eq_ignore_ascii_case(normalized))
}

fn classify_retry(err: IptvError) -> backoff::Error<IptvError> {
    match &err {
        IptvError::Http(e) if e.is_timeout() || e.is_connect() => backoff::Error::transient(err),
        IptvError::SessionExpired => backoff::Error::transient(err),
        _ => backoff::Error::permanent(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_hls_content_types() {
        assert!(is_hls_content_type("application/vnd.apple.mpegurl"));
        assert!(is_hls_content_type("application/x-mpegurl; charset=utf-8"));
        assert!(!is_hls_content_type("video/mp2t"));
    }

    #[test]
    fn resolves_relative_segment_against_root() {
        let root = Url::parse("https://cdn.example.com/live/channel1/index.m3u8").unwrap();
        let target = resolve_segment_target("seg000.ts", Some(&root)).unwrap();
        assert_eq!(target, "https://cdn.example.com/live/channel1/seg000.ts");
    }

    #[test]
    fn decodes_absolute_segment_path_without_root() {
        let encoded = "https%3A%2F%2Fother.example.com%2Fseg000.ts";
        let target = resolve_segment_target(encoded, None).unwrap();
        assert_eq!(target, "https://other.example.com/seg000.ts");
    }

    #[test]
    fn fails_relative_segment_without_cached_root() {
        assert!(resolve_segment_target("seg000.ts", None).is_err());
    }
}
