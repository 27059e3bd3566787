//! Rate-limit aware client for the Discord REST API.
//!
//! Every outbound call funnels through [`DiscordHttpClient::request`] so that
//! auth, per-bucket back-off and error mapping live in one place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{ApplicationCommand, InteractionResponse, RateLimitInfo};

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/fishing-discord, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const MAX_RETRIES: u32 = 5;
const MAX_WAIT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Rate-limit tracker (per bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Default)]
struct RateLimiter {
    /// Route key -> bucket id.
    route_buckets: HashMap<String, String>,
    buckets: HashMap<String, BucketState>,
    /// No request may go out before this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until.filter(|&until| until > now) {
            return Some(until - now);
        }
        let bucket = self.buckets.get(self.route_buckets.get(route_key)?)?;
        (bucket.remaining == 0 && bucket.resets_at > now).then(|| bucket.resets_at - now)
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_after = info.reset_after.and_then(seconds);
        if info.is_global {
            self.global_until = Some(now + reset_after.unwrap_or(Duration::from_secs(1)));
        }
        if let Some(bucket) = &info.bucket {
            self.route_buckets.insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: now + reset_after.unwrap_or(Duration::from_secs(1)),
                },
            );
        }
    }
}

/// A wait in seconds as a `Duration`. Negative and non-finite values are
/// dropped.
fn seconds(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after")
            .and_then(|s| s.parse().ok())
            .filter(|s: &f64| s.is_finite() && *s >= 0.0),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true"),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// Cheap to clone; the connection pool and limiter are shared.
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            token: token.into(),
            client,
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    /// Send a request to `{BASE_URL}/{path}` and return the raw body.
    ///
    /// `route_key` groups requests for rate limiting, e.g.
    /// `POST /interactions/{id}/callback`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            let delay = self.limiter.lock().await.delay_for(route_key, Instant::now());
            if let Some(delay) = delay {
                let delay = delay.min(MAX_WAIT);
                debug!(route = route_key, delay_ms = delay.as_millis() as u64, "rate-limit pre-emptive backoff");
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("authorization", format!("Bot {}", self.token));
            if let Some(json) = body {
                req = req.json(json);
            }
            let resp = req.send().await?;

            let status = resp.status();
            let info = parse_rate_limit_headers(resp.headers());
            self.limiter
                .lock()
                .await
                .update(route_key, &info, Instant::now());

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = info
                    .reset_after
                    .and_then(seconds)
                    .unwrap_or(Duration::from_secs(1))
                    .min(MAX_WAIT);
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after.as_secs_f64(),
                    global = info.is_global,
                    "rate-limited by Discord, backing off"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            let bytes = resp.bytes().await?;
            if status.is_success() {
                return Ok(bytes.to_vec());
            }
            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Answer an interaction. Must happen within 3 seconds of receipt.
    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let path = format!("interactions/{interaction_id}/{interaction_token}/callback");
        let body = serde_json::to_value(response)?;
        self.request(
            Method::POST,
            &path,
            "POST /interactions/{id}/{token}/callback",
            Some(&body),
        )
        .await
        .map(drop)
    }

    /// Replace every global command of the application with `commands`.
    pub async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{application_id}/commands");
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &path,
            &format!("PUT /applications/{application_id}/commands"),
            Some(&body),
        )
        .await
    }

    /// Replace the application's commands in one guild.
    pub async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{application_id}/guilds/{guild_id}/commands");
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &path,
            &format!("PUT /applications/{application_id}/guilds/{guild_id}/commands"),
            Some(&body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn parses_bucket_headers() {
        let info = parse_rate_limit_headers(&headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "1.5"),
            ("x-ratelimit-bucket", "abcd"),
        ]));
        assert_eq!(info.remaining, Some(0));
        assert_eq!(info.reset_after, Some(1.5));
        assert_eq!(info.bucket.as_deref(), Some("abcd"));
        assert!(!info.is_global);
    }

    #[test]
    fn missing_headers_parse_to_defaults() {
        let info = parse_rate_limit_headers(&HeaderMap::new());
        assert!(info.remaining.is_none() && info.bucket.is_none());
        assert!(!info.is_global);
    }

    #[test]
    fn exhausted_bucket_delays_its_routes() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        let info = RateLimitInfo {
            remaining: Some(0),
            reset_after: Some(2.0),
            bucket: Some("b1".to_string()),
            is_global: false,
        };
        limiter.update("PUT /x", &info, now);

        assert_eq!(limiter.delay_for("PUT /x", now), Some(Duration::from_secs(2)));
        assert_eq!(limiter.delay_for("PUT /y", now), None);
        assert_eq!(limiter.delay_for("PUT /x", now + Duration::from_secs(3)), None);
    }

    #[test]
    fn bucket_with_remaining_does_not_delay() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        let info = RateLimitInfo {
            remaining: Some(4),
            reset_after: Some(2.0),
            bucket: Some("b1".to_string()),
            is_global: false,
        };
        limiter.update("PUT /x", &info, now);
        assert_eq!(limiter.delay_for("PUT /x", now), None);
    }

    #[test]
    fn global_limit_delays_every_route() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        let info = RateLimitInfo {
            reset_after: Some(5.0),
            is_global: true,
            ..Default::default()
        };
        limiter.update("POST /a", &info, now);
        assert_eq!(limiter.delay_for("anything", now), Some(Duration::from_secs(5)));
    }

    #[test]
    fn unusable_reset_after_headers_are_ignored() {
        for raw in ["-1", "NaN", "inf"] {
            let info = parse_rate_limit_headers(&headers(&[("x-ratelimit-reset-after", raw)]));
            assert_eq!(info.reset_after, None, "{raw}");
        }
    }

    #[test]
    fn negative_reset_after_falls_back_to_one_second() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        let info = RateLimitInfo {
            remaining: Some(0),
            reset_after: Some(-1.0),
            bucket: Some("b1".to_string()),
            is_global: true,
        };
        limiter.update("PUT /x", &info, now);
        assert_eq!(limiter.delay_for("PUT /x", now), Some(Duration::from_secs(1)));

        limiter.update("PUT /x", &RateLimitInfo { reset_after: Some(f64::NAN), ..info }, now);
        assert_eq!(limiter.delay_for("PUT /x", now), Some(Duration::from_secs(1)));
    }

    #[test]
    fn debug_hides_token() {
        let client = DiscordHttpClient::new("secret-token").unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
