//! Rate-limit aware client for the Discord REST API.
//!
//! Every call funnels through [`DiscordHttpClient::request`], which applies
//! auth headers, waits out known bucket exhaustion, and retries 429s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::{debug, warn};

use crate::types::*;

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (",
    env!("CARGO_PKG_NAME"),
    ", ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const MAX_RETRIES: u32 = 5;
const MAX_WAIT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Per-bucket rate limiter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Default)]
struct RateLimiter {
    /// Route key to the bucket Discord reported for it.
    route_buckets: HashMap<String, String>,
    buckets: HashMap<String, BucketState>,
    global_until: Option<Instant>,
}

impl RateLimiter {
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until.filter(|&until| until > now) {
            return Some(until - now);
        }
        let state = self
            .route_buckets
            .get(route_key)
            .and_then(|bucket| self.buckets.get(bucket))?;
        (state.remaining == 0 && state.resets_at > now).then(|| state.resets_at - now)
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_after = info.reset_after.map(Duration::from_secs_f64);

        if info.is_global {
            self.global_until = Some(now + reset_after.unwrap_or(Duration::from_secs(1)));
        }

        if let Some(bucket) = &info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());
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

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after")
            .or_else(|| header("retry-after"))
            .and_then(|s| s.parse().ok())
            .filter(|secs: &f64| secs.is_finite() && *secs >= 0.0),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true")
            || header("x-ratelimit-scope") == Some("global"),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum HttpError {
    /// Discord answered with a non-success status.
    Api {
        status: u16,
        body: String,
        route: String,
    },
    Transport(reqwest::Error),
    Serde(serde_json::Error),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Api {
                status,
                body,
                route,
            } => write!(f, "Discord API error {} on {}: {}", status, route, api_message(body)),
            HttpError::Transport(e) => write!(f, "HTTP transport error: {}", e),
            HttpError::Serde(e) => write!(f, "Serialisation error: {}", e),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HttpError::Api { .. } => None,
            HttpError::Transport(e) => Some(e),
            HttpError::Serde(e) => Some(e),
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        HttpError::Transport(e)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        HttpError::Serde(e)
    }
}

/// Discord error bodies look like `{"message": "Missing Permissions", ...}`.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the connection pool and rate-limit state.
#[derive(Clone)]
pub struct DiscordHttpClient {
    client: reqwest::Client,
    token: Arc<str>,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    pub fn new(token: impl AsRef<str>) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token: Arc::from(token.as_ref()),
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    /// Send a request to `{BASE_URL}/{path}` and return the raw body.
    ///
    /// `route_key` groups requests for rate limiting, e.g.
    /// `PUT /guilds/{guild_id}/members/roles`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            let wait = self.limiter.lock().await.delay_for(route_key, Instant::now());
            if let Some(wait) = wait {
                let wait = wait.min(MAX_WAIT);
                debug!(route = route_key, wait_ms = millis(wait), "waiting for rate-limit bucket");
                tokio::time::sleep(wait).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("authorization", format!("Bot {}", self.token));
            if let Some(json) = body {
                req = req.json(json);
            } else if method == Method::PUT {
                req = req.header("content-length", "0");
            }

            let resp = req.send().await?;
            let status = resp.status();
            let info = parse_rate_limit_headers(resp.headers());
            self.limiter
                .lock()
                .await
                .update(route_key, &info, Instant::now());

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let wait = info
                    .reset_after
                    .map_or(Duration::from_secs(1), Duration::from_secs_f64)
                    .min(MAX_WAIT);
                warn!(
                    route = route_key,
                    attempt,
                    wait_ms = millis(wait),
                    global = info.is_global,
                    "rate-limited by Discord, retrying"
                );
                tokio::time::sleep(wait).await;
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
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    pub async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // -- guild members and roles -------------------------------------------------

    /// `PUT /guilds/{guild}/members/{user}/roles/{role}`; 204 on success.
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), HttpError> {
        let path = format!("guilds/{}/members/{}/roles/{}", guild_id, user_id, role_id);
        let route_key = format!("PUT /guilds/{}/members/roles", guild_id);
        self.request(Method::PUT, &path, &route_key, None).await?;
        Ok(())
    }

    pub async fn get_guild_roles(&self, guild_id: &str) -> Result<Vec<Role>, HttpError> {
        let path = format!("guilds/{}/roles", guild_id);
        let route_key = format!("GET /guilds/{}/roles", guild_id);
        self.request_json(Method::GET, &path, &route_key, None).await
    }

    pub async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<GuildMember, HttpError> {
        let path = format!("guilds/{}/members/{}", guild_id, user_id);
        let route_key = format!("GET /guilds/{}/members", guild_id);
        self.request_json(Method::GET, &path, &route_key, None).await
    }

    // -- interactions ----------------------------------------------------------------

    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let path = format!("interactions/{}/{}/callback", interaction_id, interaction_token);
        let body = serde_json::to_value(response)?;
        self.request(Method::POST, &path, "POST /interactions/callback", Some(&body))
            .await?;
        Ok(())
    }

    // -- command registration --------------------------------------------------------

    pub async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{}/commands", application_id);
        let route_key = format!("PUT /applications/{}/commands", application_id);
        let body = serde_json::to_value(commands)?;
        self.request_json(Method::PUT, &path, &route_key, Some(&body))
            .await
    }

    /// Guild-scoped commands update instantly, unlike global ones.
    pub async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{}/guilds/{}/commands", application_id, guild_id);
        let route_key = format!("PUT /applications/{}/guilds/{}/commands", application_id, guild_id);
        let body = serde_json::to_value(commands)?;
        self.request_json(Method::PUT, &path, &route_key, Some(&body))
            .await
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
