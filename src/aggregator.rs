use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::probe::{ApiProbe, BotProbe, LandingProbe, Probe};
use crate::{ProbeConfig, StatusSnapshot, StatusStore, StoreError};

/// Runs the landing, API and bot probes together and folds them into a
/// [`StatusSnapshot`].
#[derive(Clone)]
pub struct StatusAggregator {
    landing: Arc<dyn Probe>,
    api: Arc<dyn Probe>,
    bot: Arc<dyn Probe>,
}

impl StatusAggregator {
    pub fn new(landing: Arc<dyn Probe>, api: Arc<dyn Probe>, bot: Arc<dyn Probe>) -> Self {
        Self { landing, api, bot }
    }

    /// Builds the HTTP probes described by `config`, sharing one client.
    pub fn from_config(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("audioflux-status/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(
            Arc::new(LandingProbe::new(client.clone(), config)),
            Arc::new(ApiProbe::new(client.clone(), config)),
            Arc::new(BotProbe::new(client, config)),
        ))
    }

    /// Checks every service. Results are always ordered landing, API, bot.
    pub async fn collect(&self) -> StatusSnapshot {
        let start = Instant::now();
        let (landing, api, bot) =
            tokio::join!(self.landing.check(), self.api.check(), self.bot.check());
        let snapshot = StatusSnapshot::new(vec![landing, api, bot], Utc::now());

        info!(
            overall_status = %snapshot.overall_status(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Health check completed"
        );
        snapshot
    }

    /// Checks every service and replaces whatever `store` held before.
    pub async fn refresh<S>(&self, store: &S) -> Result<StatusSnapshot, StoreError>
    where
        S: StatusStore + ?Sized,
    {
        let snapshot = self.collect().await;
        store.set(snapshot.clone()).await?;
        Ok(snapshot)
    }
}
