//! Sync engine configuration.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SyncError, SyncResult};
use crate::fetch::DEFAULT_FETCH_TIMEOUT;

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_user_agent() -> String {
    format!("calsync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Settings for one [`SyncEngine`](crate::sync::SyncEngine).
///
/// Durations are written the humantime way (`"30s"`, `"2m"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Time budget for each fetch strategy.
    #[serde(default = "default_fetch_timeout", with = "humantime_duration")]
    pub fetch_timeout: Duration,

    /// Overall budget for retrieving the feed across all strategies.
    #[serde(default, with = "humantime_duration_opt")]
    pub run_deadline: Option<Duration>,

    /// Identifying client signature sent with feed requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Zone used for booking times when a connection has none of its own.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            fetch_timeout: default_fetch_timeout(),
            run_deadline: None,
            user_agent: default_user_agent(),
            default_timezone: default_timezone(),
        }
    }
}

impl SyncConfig {
    pub fn timezone(&self) -> SyncResult<Tz> {
        self.default_timezone.parse::<Tz>().map_err(|_| {
            SyncError::Config(format!("Unknown timezone '{}'", self.default_timezone))
        })
    }
}

mod humantime_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod humantime_duration_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.collect_str(&humantime::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| humantime::parse_duration(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
