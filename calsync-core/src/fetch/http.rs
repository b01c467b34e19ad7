//! HTTP transports for calendar feeds.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Response};

use crate::config::SyncConfig;
use crate::error::{StrategyError, SyncError, SyncResult};
use crate::fetch::{FeedStrategy, FetchContext, FetchedFeed};
use crate::ics::parse_calendar;

const CALENDAR_ACCEPT: &str = "text/calendar, text/plain;q=0.9, */*;q=0.8";

/// Shared HTTP client carrying the configured identifying user agent.
pub fn http_client(config: &SyncConfig) -> SyncResult<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.fetch_timeout)
        .build()
        .map_err(|e| SyncError::Config(format!("Could not build HTTP client: {e}")))
}

/// GET the feed and parse it strictly as iCalendar.
///
/// Fails when the body is anything but a well-formed calendar, leaving
/// lenient handling to a later strategy.
pub struct StructuredIcsStrategy {
    client: Client,
}

impl StructuredIcsStrategy {
    pub fn new(client: Client) -> Self {
        StructuredIcsStrategy { client }
    }
}

#[async_trait]
impl FeedStrategy for StructuredIcsStrategy {
    fn name(&self) -> &str {
        "structured"
    }

    async fn fetch(&self, url: &str, _ctx: &FetchContext) -> Result<FetchedFeed, StrategyError> {
        let response = self.client.get(url).send().await?;
        let body = success_body(response).await?;

        let events = parse_calendar(&body).map_err(|e| StrategyError::Parse(e.to_string()))?;
        Ok(FetchedFeed::Events(events))
    }
}

/// GET the feed with explicit calendar-accepting headers and hand back the
/// raw text for best-effort parsing.
pub struct RawHttpStrategy {
    client: Client,
}

impl RawHttpStrategy {
    pub fn new(client: Client) -> Self {
        RawHttpStrategy { client }
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(CALENDAR_ACCEPT));
        headers
    }
}

#[async_trait]
impl FeedStrategy for RawHttpStrategy {
    fn name(&self) -> &str {
        "raw"
    }

    async fn fetch(&self, url: &str, _ctx: &FetchContext) -> Result<FetchedFeed, StrategyError> {
        let response = self.client.get(url).headers(Self::headers()).send().await?;
        let body = success_body(response).await?;
        Ok(FetchedFeed::Raw(body))
    }
}

async fn success_body(response: Response) -> Result<String, StrategyError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StrategyError::Status(status.as_u16()));
    }
    Ok(response.text().await?)
}
