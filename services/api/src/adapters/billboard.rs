//! services/api/src/adapters/billboard.rs
//!
//! This module contains the adapter for the external chart-data provider. It
//! implements the `ChartProvider` port from the `core` crate. The provider is
//! an opaque HTTP service returning ranked chart entries for a date; only the
//! rank-1 entry is ever consulted.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use training_song_core::domain::ChartEntry;
use training_song_core::ports::{ChartError, ChartProvider};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that fetches chart data over HTTP.
///
/// There is deliberately no caching layer: call volume is low and repeated
/// lookups for the same date simply re-fetch.
#[derive(Clone)]
pub struct BillboardAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl BillboardAdapter {
    /// Creates a new `BillboardAdapter` against the configured provider root.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ChartError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChartError::Provider(e.to_string()))?;
        Ok(Self { http, base_url })
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Deserialize)]
struct ChartResponse {
    entries: Vec<EntryRecord>,
}

#[derive(Deserialize)]
struct EntryRecord {
    #[serde(default)]
    rank: u32,
    title: String,
    artist: String,
    #[serde(default)]
    weeks_on_chart: u32,
}

impl EntryRecord {
    fn to_domain(self) -> ChartEntry {
        ChartEntry {
            title: self.title,
            artist: self.artist,
            weeks_on_chart: self.weeks_on_chart,
        }
    }
}

//=========================================================================================
// `ChartProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChartProvider for BillboardAdapter {
    async fn top_entry(&self, date: NaiveDate, chart: &str) -> Result<ChartEntry, ChartError> {
        let url = format!("{}/charts/{}", self.base_url.trim_end_matches('/'), chart);

        let response = self
            .http
            .get(&url)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .map_err(|e| ChartError::Provider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ChartError::Unavailable {
                chart: chart.to_string(),
                date,
            });
        }
        if !response.status().is_success() {
            return Err(ChartError::Provider(format!(
                "chart provider returned HTTP {}",
                response.status()
            )));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ChartError::Provider(e.to_string()))?;

        // The provider returns entries ranked; take rank 1 (or the first
        // entry when ranks are absent). An empty chart is a coverage gap.
        let top = body
            .entries
            .into_iter()
            .min_by_key(|entry| entry.rank)
            .ok_or_else(|| ChartError::Unavailable {
                chart: chart.to_string(),
                date,
            })?;

        Ok(top.to_domain())
    }
}
