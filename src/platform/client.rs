//! HTTP implementation of [`Platform`] for the direct-messaging API.
//!
//! Every request goes through [`HttpPlatform::request`], which owns the retry
//! policy: transport errors and 5xx responses back off exponentially with
//! jitter, 429 responses pause for a longer fixed step per attempt. Once the
//! attempts are used up the call fails with
//! [`PlatformError::RetriesExhausted`].

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use super::wire::{parse_inbox, parse_thread};
use super::{Platform, PlatformError, ThreadState, ThreadSummary};
use crate::config::PlatformConfig;

/// Longest response body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Retry schedule for platform requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// First backoff step; doubles on each further attempt.
    pub backoff_base: Duration,
    /// Pause per attempt after a 429 response.
    pub rate_limit_pause: Duration,
}

impl RetryPolicy {
    /// Build the policy from platform config.
    pub fn from_config(cfg: &PlatformConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            rate_limit_pause: Duration::from_secs(cfg.rate_limit_pause_secs),
        }
    }

    /// Backoff before retrying after failed attempt number `attempt` (1-based).
    ///
    /// Jitter of up to a quarter of the step is added.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1).min(16))
            .unwrap_or(u32::MAX);
        let step = self.backoff_base.saturating_mul(factor);
        let jitter_cap = u64::try_from(step.as_millis() / 4).unwrap_or(0);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        step.saturating_add(Duration::from_millis(jitter))
    }

    /// Pause after a 429 on attempt number `attempt` (1-based).
    pub fn rate_limit_wait(&self, attempt: u32) -> Duration {
        self.rate_limit_pause.saturating_mul(attempt.max(1))
    }
}

/// A response that was not retried.
#[derive(Debug)]
struct HttpReply {
    status: StatusCode,
    body: String,
}

/// Platform client authenticated with a session cookie.
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    group_min_users: usize,
}

impl std::fmt::Debug for HttpPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatform")
            .field("base_url", &self.base_url)
            .field("session", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpPlatform {
    /// Build a client for one account.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Config`] if a header cannot be encoded and
    /// [`PlatformError::Http`] if the HTTP client cannot be built.
    pub fn new(
        cfg: &PlatformConfig,
        session_id: &str,
        group_min_users: usize,
    ) -> Result<Self, PlatformError> {
        let mut headers = HeaderMap::new();
        let mut insert = |name: &'static str, value: String| -> Result<(), PlatformError> {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| PlatformError::Config(format!("header {name}: {e}")))?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        };
        insert("user-agent", cfg.user_agent.clone())?;
        insert("x-ig-app-id", cfg.app_id.clone())?;
        insert("x-ig-device-id", uuid::Uuid::new_v4().to_string())?;
        insert("accept-language", "en-US,en;q=0.9".to_owned())?;
        insert("cookie", format!("sessionid={session_id};"))?;

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            retry: RetryPolicy::from_config(cfg),
            group_min_users,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<&[(&str, String)]>,
    ) -> Result<HttpReply, PlatformError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let attempts = self.retry.max_attempts.max(1);
        let mut last = String::from("no attempt made");

        for attempt in 1..=attempts {
            let mut req = self.client.request(method.clone(), &url);
            if let Some(form) = form {
                req = req.form(form);
            }

            let wait = match req.send().await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    last = "status 429".to_owned();
                    let wait = self.retry.rate_limit_wait(attempt);
                    warn!(endpoint, attempt, ?wait, "rate limited by platform");
                    wait
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last = format!("status {}", resp.status());
                    let wait = self.retry.backoff(attempt);
                    warn!(endpoint, attempt, status = %resp.status(), "platform server error");
                    wait
                }
                Ok(resp) => {
                    let status = resp.status();
                    match resp.text().await {
                        Ok(body) => {
                            debug!(endpoint, %status, "platform response");
                            return Ok(HttpReply { status, body });
                        }
                        Err(e) => {
                            last = e.to_string();
                            warn!(endpoint, attempt, error = %e, "failed to read platform response");
                            self.retry.backoff(attempt)
                        }
                    }
                }
                Err(e) => {
                    last = e.to_string();
                    warn!(endpoint, attempt, error = %e, "platform request failed");
                    self.retry.backoff(attempt)
                }
            };

            if attempt < attempts {
                tokio::time::sleep(wait).await;
            }
        }

        Err(PlatformError::RetriesExhausted {
            endpoint: endpoint.to_owned(),
            attempts,
            last,
        })
    }

    async fn get_ok(&self, endpoint: &str) -> Result<String, PlatformError> {
        let reply = self.request(Method::GET, endpoint, None).await?;
        if !reply.status.is_success() {
            return Err(PlatformError::HttpStatus {
                status: reply.status.as_u16(),
                body: truncate_body(&reply.body),
            });
        }
        Ok(reply.body)
    }

    async fn post_accepted(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<bool, PlatformError> {
        let reply = self.request(Method::POST, endpoint, Some(form)).await?;
        if !reply.status.is_success() {
            warn!(
                endpoint,
                status = reply.status.as_u16(),
                body = %truncate_body(&reply.body),
                "platform refused request"
            );
        }
        Ok(reply.status.is_success())
    }
}

fn truncate_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}

fn json_list(id: &str) -> String {
    serde_json::json!([id]).to_string()
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn fetch_inbox(&self) -> Result<Vec<ThreadSummary>, PlatformError> {
        let body = self.get_ok("direct_v2/inbox/?persistentBadging=true").await?;
        parse_inbox(&body, self.group_min_users)
    }

    async fn fetch_thread_items(
        &self,
        thread_id: &str,
    ) -> Result<Vec<serde_json::Value>, PlatformError> {
        let body = self.get_ok(&format!("direct_v2/threads/{thread_id}/")).await?;
        let (_, items) = parse_thread(&body)?;
        Ok(items)
    }

    async fn fetch_thread_state(&self, thread_id: &str) -> Result<ThreadState, PlatformError> {
        let body = self.get_ok(&format!("direct_v2/threads/{thread_id}/")).await?;
        let (state, _) = parse_thread(&body)?;
        Ok(state)
    }

    async fn remove_member(&self, thread_id: &str, user_id: &str) -> Result<bool, PlatformError> {
        self.post_accepted(
            &format!("direct_v2/threads/{thread_id}/remove_user/"),
            &[("user_id", user_id.to_owned())],
        )
        .await
    }

    async fn add_member(&self, thread_id: &str, user_id: &str) -> Result<bool, PlatformError> {
        self.post_accepted(
            &format!("direct_v2/threads/{thread_id}/add_user/"),
            &[("user_ids", json_list(user_id))],
        )
        .await
    }

    async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<bool, PlatformError> {
        let mut form = vec![
            ("action", "send_item".to_owned()),
            ("thread_ids", json_list(thread_id)),
            ("text", text.to_owned()),
        ];
        if let Some(item_id) = reply_to {
            form.push(("replied_to_item_id", item_id.to_owned()));
            form.push(("reply_type", "reply".to_owned()));
        }
        self.post_accepted("direct_v2/threads/broadcast/text/", &form)
            .await
    }

    async fn send_direct(&self, user_id: &str, text: &str) -> Result<bool, PlatformError> {
        let recipients = serde_json::json!([[user_id]]).to_string();
        self.post_accepted(
            "direct_v2/threads/broadcast/text/",
            &[
                ("action", "send_item".to_owned()),
                ("recipient_users", recipients),
                ("text", text.to_owned()),
            ],
        )
        .await
    }

    async fn leave_thread(&self, thread_id: &str) -> Result<bool, PlatformError> {
        self.post_accepted(&format!("direct_v2/threads/{thread_id}/leave/"), &[])
            .await
    }
}
