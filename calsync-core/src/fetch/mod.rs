//! Feed retrieval through an ordered list of transport strategies.
//!
//! Feeds published by calendar platforms are unreliable: some serve strict
//! RFC 5545, some serve almost-iCalendar that a strict parser rejects, some
//! refuse clients that do not ask for `text/calendar`. The fetcher tries each
//! strategy in order and uses the first one that succeeds.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{StrategyError, SyncError, SyncResult};
use crate::event::ExternalEvent;

pub use http::{RawHttpStrategy, StructuredIcsStrategy, http_client};

/// Default per-strategy time budget.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What a strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedFeed {
    /// Already parsed into event records
    Events(Vec<ExternalEvent>),
    /// Raw feed text, still to be parsed
    Raw(String),
}

/// Who the feed is being fetched for. Carried on fetch log events.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub connection_id: String,
    pub platform: String,
}

/// One way of retrieving a feed.
#[async_trait]
pub trait FeedStrategy: Send + Sync {
    /// Short name used in logs and failure summaries.
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str, ctx: &FetchContext) -> Result<FetchedFeed, StrategyError>;
}

/// Tries strategies in order, each under its own timeout.
pub struct Fetcher {
    strategies: Vec<Box<dyn FeedStrategy>>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(strategies: Vec<Box<dyn FeedStrategy>>, timeout: Duration) -> Self {
        Fetcher {
            strategies,
            timeout,
        }
    }

    /// The default HTTP fetcher: strict iCalendar first, then raw text with
    /// calendar-accepting headers.
    pub fn http(config: &SyncConfig) -> SyncResult<Self> {
        let client = http_client(config)?;
        let strategies: Vec<Box<dyn FeedStrategy>> = vec![
            Box::new(StructuredIcsStrategy::new(client.clone())),
            Box::new(RawHttpStrategy::new(client)),
        ];
        Ok(Fetcher::new(strategies, config.fetch_timeout))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Fetch `url`, returning the first successful strategy's result.
    ///
    /// Fails with [`SyncError::FetchFailed`] listing every strategy's error
    /// when none succeeds.
    pub async fn fetch(&self, url: &str, ctx: &FetchContext) -> SyncResult<FetchedFeed> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            debug!(
                connection_id = %ctx.connection_id,
                platform = %ctx.platform,
                strategy = strategy.name(),
                %url,
                "fetching feed"
            );

            let result = timeout(self.timeout, strategy.fetch(url, ctx))
                .await
                .unwrap_or(Err(StrategyError::Timeout(self.timeout)));

            match result {
                Ok(feed) => {
                    info!(
                        connection_id = %ctx.connection_id,
                        platform = %ctx.platform,
                        strategy = strategy.name(),
                        "feed fetched"
                    );
                    return Ok(feed);
                }
                Err(e) => {
                    warn!(
                        connection_id = %ctx.connection_id,
                        platform = %ctx.platform,
                        strategy = strategy.name(),
                        error = %e,
                        "fetch strategy failed"
                    );
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        let reason = if failures.is_empty() {
            "no fetch strategies configured".to_string()
        } else {
            failures.join("; ")
        };

        Err(SyncError::FetchFailed { reason })
    }
}
