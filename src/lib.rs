use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Display;

pub mod aggregator;
pub mod config;
pub mod probe;

pub use aggregator::StatusAggregator;
pub use config::ProbeConfig;

/// One of the external dependencies being watched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    #[serde(rename = "Landing Page")]
    Landing,
    #[serde(rename = "Music API")]
    Api,
    #[serde(rename = "Telegram Bot")]
    Bot,
}

impl Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Landing => write!(f, "Landing Page"),
            Self::Api => write!(f, "Music API"),
            Self::Bot => write!(f, "Telegram Bot"),
        }
    }
}

/// The health of a single service, or of all of them together.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Operational,
    Degraded,
    Down,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operational => write!(f, "operational"),
            Self::Degraded => write!(f, "degraded"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// The outcome of one probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: ServiceName,
    pub status: Status,
    /// Wall-clock duration of the probe, in milliseconds.
    pub response_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(serialize_with = "iso8601")]
    pub last_checked: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn new(
        name: ServiceName,
        status: Status,
        response_time: u64,
        message: impl Into<String>,
        last_checked: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            status,
            response_time,
            message: Some(message.into()),
            last_checked,
        }
    }
}

/// Every monitored service at one point in time.
///
/// `overall_status` is computed from `services` when the snapshot is built
/// and cannot be set on its own.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    services: Vec<ServiceStatus>,
    overall_status: Status,
    #[serde(serialize_with = "iso8601")]
    last_checked: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn new(services: Vec<ServiceStatus>, last_checked: DateTime<Utc>) -> Self {
        let overall_status = overall_status(&services);
        Self {
            services,
            overall_status,
            last_checked,
        }
    }

    pub fn services(&self) -> &[ServiceStatus] {
        &self.services
    }

    pub fn overall_status(&self) -> Status {
        self.overall_status
    }

    pub fn last_checked(&self) -> DateTime<Utc> {
        self.last_checked
    }
}

/// Reduces per-service statuses to a single one.
///
/// Everything down is `Down`. A partial outage or any degraded service is
/// `Degraded`. Degraded services never escalate to `Down`, even when all of
/// them are degraded.
#[must_use]
pub fn overall_status(services: &[ServiceStatus]) -> Status {
    let all_down = !services.is_empty() && services.iter().all(|s| s.status == Status::Down);
    if all_down {
        Status::Down
    } else if services
        .iter()
        .any(|s| matches!(s.status, Status::Down | Status::Degraded))
    {
        Status::Degraded
    } else {
        Status::Operational
    }
}

/// Formats timestamps the way browsers do (`2024-01-01T00:00:00.000Z`).
pub fn iso8601<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("status store is unavailable")]
    Unavailable,
}

/// Holds the latest snapshot, if any.
///
/// `set` replaces the whole snapshot: readers see either the old one or the
/// new one, never a mix.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self) -> Result<Option<StatusSnapshot>, StoreError>;
    async fn set(&self, snapshot: StatusSnapshot) -> Result<(), StoreError>;
}
