//! Seed data: the connections and customers the server starts with.
//!
//! ```toml
//! [[connections]]
//! id = "conn-1"
//! owner_id = "provider-1"
//! platform = "google"
//! feed_url = "webcal://calendar.example.com/feed.ics"
//! timezone = "Europe/London"
//!
//! [[customers]]
//! id = "cust-1"
//! owner_id = "provider-1"
//! name = "Jane Doe"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use calsync_core::{CalendarConnection, Customer};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub connections: Vec<CalendarConnection>,
    #[serde(default)]
    pub customers: Vec<Customer>,
}

impl SeedData {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read data file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid data file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
