use std::time::Duration;

pub const DEFAULT_LANDING_URL: &str = "https://audioflux.example.com";
pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Where the probes point and how long they may take.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub landing_url: String,
    pub api_url: String,
    /// `None` (or an empty token) makes the bot check report `degraded`
    /// without touching the network.
    pub bot_token: Option<String>,
    pub telegram_api_url: String,
    pub timeout: Duration,
}

impl ProbeConfig {
    /// The configured bot token, ignoring blank values.
    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            landing_url: DEFAULT_LANDING_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            bot_token: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}
