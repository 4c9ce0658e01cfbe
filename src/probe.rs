//! Reachability checks for the landing page, the music API and the Telegram bot.
//!
//! A probe never fails: network errors, timeouts, bad status codes and
//! unparseable bodies all come back as a [`ServiceStatus`] describing what
//! went wrong.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{ProbeConfig, ServiceName, ServiceStatus, Status};

#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> ServiceStatus;
}

/// `HEAD` request against the landing page.
pub struct LandingProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl LandingProbe {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            url: config.landing_url.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl Probe for LandingProbe {
    async fn check(&self) -> ServiceStatus {
        let checked_at = Utc::now();
        let start = Instant::now();
        let result = self
            .client
            .head(&self.url)
            .timeout(self.timeout)
            .send()
            .await;
        let (status, message) = match result {
            Ok(response) if is_ok(response.status()) => (
                Status::Operational,
                format!("HTTP {}", response.status().as_u16()),
            ),
            Ok(response) => (
                Status::Down,
                format!("Error: {}", response.status().as_u16()),
            ),
            Err(e) => (Status::Down, describe(&e, self.timeout)),
        };
        report(ServiceStatus::new(
            ServiceName::Landing,
            status,
            elapsed_ms(start),
            message,
            checked_at,
        ))
    }
}

/// Runs a sample song search against the music API.
pub struct ApiProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl ApiProbe {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            url: format!(
                "{}/search/songs?query=test",
                config.api_url.trim_end_matches('/')
            ),
            timeout: config.timeout,
        }
    }

    async fn search(&self) -> Result<(Status, String), reqwest::Error> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let code = response.status();
        if !is_ok(code) {
            return Ok((Status::Down, format!("HTTP {}", code.as_u16())));
        }
        let body: Value = response.json().await?;
        Ok((
            Status::Operational,
            format!("{} results returned", result_count(&body)),
        ))
    }
}

#[async_trait]
impl Probe for ApiProbe {
    async fn check(&self) -> ServiceStatus {
        let checked_at = Utc::now();
        let start = Instant::now();
        let (status, message) = self
            .search()
            .await
            .unwrap_or_else(|e| (Status::Down, describe(&e, self.timeout)));
        report(ServiceStatus::new(
            ServiceName::Api,
            status,
            elapsed_ms(start),
            message,
            checked_at,
        ))
    }
}

/// Number of entries in `results`, at the top level or under `data`.
fn result_count(body: &Value) -> usize {
    body.get("results")
        .or_else(|| body.get("data").and_then(|data| data.get("results")))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Calls `getMe` with the bot token.
pub struct BotProbe {
    client: Client,
    /// `None` when no token is configured.
    url: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GetMe {
    result: Option<BotUser>,
}

#[derive(Deserialize)]
struct BotUser {
    username: Option<String>,
}

impl BotProbe {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        let url = config.bot_token().map(|token| {
            format!(
                "{}/bot{}/getMe",
                config.telegram_api_url.trim_end_matches('/'),
                token
            )
        });
        Self {
            client,
            url,
            timeout: config.timeout,
        }
    }

    async fn get_me(&self, url: &str) -> Result<(Status, String), reqwest::Error> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        let code = response.status();
        if !is_ok(code) {
            return Ok((Status::Down, format!("HTTP {}", code.as_u16())));
        }
        let me: GetMe = response.json().await?;
        let message = match me.result.and_then(|user| user.username) {
            Some(username) => format!("@{username}"),
            None => "Bot is reachable".to_string(),
        };
        Ok((Status::Operational, message))
    }
}

#[async_trait]
impl Probe for BotProbe {
    async fn check(&self) -> ServiceStatus {
        let checked_at = Utc::now();
        let Some(url) = &self.url else {
            return report(ServiceStatus::new(
                ServiceName::Bot,
                Status::Degraded,
                0,
                "Bot token not configured",
                checked_at,
            ));
        };

        let start = Instant::now();
        // The URL carries the token, keep it out of error messages.
        let (status, message) = self
            .get_me(url)
            .await
            .unwrap_or_else(|e| (Status::Down, describe(&e.without_url(), self.timeout)));
        report(ServiceStatus::new(
            ServiceName::Bot,
            status,
            elapsed_ms(start),
            message,
            checked_at,
        ))
    }
}

/// Redirects are followed by the client, so a 3xx here means the redirect
/// limit was hit on a live server.
fn is_ok(code: StatusCode) -> bool {
    code.is_success() || code.is_redirection()
}

fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("Request timed out after {}ms", timeout.as_millis())
    } else {
        err.to_string()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn report(status: ServiceStatus) -> ServiceStatus {
    let message = status.message.as_deref().unwrap_or_default();
    match status.status {
        Status::Operational => debug!(
            service = %status.name,
            response_time_ms = status.response_time,
            "{message}"
        ),
        _ => warn!(
            service = %status.name,
            status = %status.status,
            response_time_ms = status.response_time,
            "{message}"
        ),
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    /// An address nothing listens on.
    async fn dead_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn config() -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_secs(2),
            ..ProbeConfig::default()
        }
    }

    #[tokio::test]
    async fn landing_up() {
        let url = serve(Router::new().route("/", get(|| async { "welcome" }))).await;
        let probe = LandingProbe::new(
            Client::new(),
            &ProbeConfig {
                landing_url: url,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.name, ServiceName::Landing);
        assert_eq!(status.status, Status::Operational);
        assert_eq!(status.message.as_deref(), Some("HTTP 200"));
    }

    #[tokio::test]
    async fn landing_error_code() {
        let url = serve(Router::new().route(
            "/",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let probe = LandingProbe::new(
            Client::new(),
            &ProbeConfig {
                landing_url: url,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert_eq!(status.message.as_deref(), Some("Error: 503"));
    }

    #[tokio::test]
    async fn landing_unreachable() {
        let probe = LandingProbe::new(
            Client::new(),
            &ProbeConfig {
                landing_url: dead_address().await,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert!(!status.message.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn landing_timeout() {
        let url = serve(Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        ))
        .await;
        let probe = LandingProbe::new(
            Client::new(),
            &ProbeConfig {
                landing_url: url,
                timeout: Duration::from_millis(100),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert_eq!(
            status.message.as_deref(),
            Some("Request timed out after 100ms")
        );
        assert!(status.response_time >= 100);
        assert!(status.response_time < 2000);
    }

    async fn slow(path: &str) -> String {
        serve(Router::new().route(
            path,
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "results": [] }))
            }),
        ))
        .await
    }

    #[tokio::test]
    async fn api_timeout() {
        let probe = ApiProbe::new(
            Client::new(),
            &ProbeConfig {
                api_url: slow("/search/songs").await,
                timeout: Duration::from_millis(100),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert_eq!(
            status.message.as_deref(),
            Some("Request timed out after 100ms")
        );
        assert!(status.response_time < 2000);
    }

    #[tokio::test]
    async fn bot_timeout_hides_token() {
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: slow("/botslow-secret/getMe").await,
                bot_token: Some("slow-secret".to_string()),
                timeout: Duration::from_millis(100),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        let message = status.message.unwrap_or_default();
        assert_eq!(message, "Request timed out after 100ms");
        assert!(!message.contains("slow-secret"));
        assert!(status.response_time < 2000);
    }

    #[tokio::test]
    async fn api_counts_results() {
        let url = serve(Router::new().route(
            "/api/search/songs",
            get(|| async { Json(json!({ "results": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] })) }),
        ))
        .await;
        let probe = ApiProbe::new(
            Client::new(),
            &ProbeConfig {
                api_url: format!("{url}/api/"),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.name, ServiceName::Api);
        assert_eq!(status.status, Status::Operational);
        assert_eq!(status.message.as_deref(), Some("3 results returned"));
    }

    #[test]
    fn result_count_shapes() {
        assert_eq!(result_count(&json!({ "results": [1, 2] })), 2);
        assert_eq!(result_count(&json!({ "data": { "results": [1] } })), 1);
        assert_eq!(result_count(&json!({ "results": "none" })), 0);
        assert_eq!(result_count(&json!({})), 0);
        assert_eq!(result_count(&json!([1, 2, 3])), 0);
    }

    #[tokio::test]
    async fn api_server_error() {
        let url = serve(Router::new().route(
            "/search/songs",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let probe = ApiProbe::new(
            Client::new(),
            &ProbeConfig {
                api_url: url,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert_eq!(status.message.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test]
    async fn api_invalid_body() {
        let url = serve(Router::new().route("/search/songs", get(|| async { "<html>" }))).await;
        let probe = ApiProbe::new(
            Client::new(),
            &ProbeConfig {
                api_url: url,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert!(status.message.is_some());
    }

    #[tokio::test]
    async fn bot_without_token_stays_offline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .fallback(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            })
            .with_state(hits.clone());
        let url = serve(router).await;
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: url,
                bot_token: None,
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.name, ServiceName::Bot);
        assert_eq!(status.status, Status::Degraded);
        assert_eq!(status.response_time, 0);
        assert_eq!(status.message.as_deref(), Some("Bot token not configured"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bot_reports_username() {
        let url = serve(Router::new().route(
            "/bottest-token/getMe",
            get(|| async { Json(json!({ "ok": true, "result": { "username": "audioflux_bot" } })) }),
        ))
        .await;
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: url,
                bot_token: Some("test-token".to_string()),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Operational);
        assert_eq!(status.message.as_deref(), Some("@audioflux_bot"));
    }

    #[tokio::test]
    async fn bot_without_username() {
        let url = serve(Router::new().route(
            "/bottest-token/getMe",
            get(|| async { Json(json!({ "ok": true, "result": {} })) }),
        ))
        .await;
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: url,
                bot_token: Some("test-token".to_string()),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Operational);
        assert_eq!(status.message.as_deref(), Some("Bot is reachable"));
    }

    #[tokio::test]
    async fn bot_rejected_token() {
        let url = serve(Router::new().route(
            "/bottest-token/getMe",
            get(|| async { StatusCode::UNAUTHORIZED }),
        ))
        .await;
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: url,
                bot_token: Some("test-token".to_string()),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert_eq!(status.message.as_deref(), Some("HTTP 401"));
    }

    #[tokio::test]
    async fn bot_error_hides_token() {
        let probe = BotProbe::new(
            Client::new(),
            &ProbeConfig {
                telegram_api_url: dead_address().await,
                bot_token: Some("secret-token".to_string()),
                ..config()
            },
        );

        let status = probe.check().await;
        assert_eq!(status.status, Status::Down);
        assert!(!status.message.unwrap_or_default().contains("secret-token"));
    }
}
