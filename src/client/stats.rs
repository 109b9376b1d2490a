//! Distributor tenant statistics.
//!
//! The distributor only serves these as an HTML table, so the page is
//! scraped row by row.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use super::transport::{Component, MimirClient};
use crate::error::{ApiError, Result};

/// Distributor statistics page.
pub const STATS_PATH: &str = "/distributor/all_user_stats";

#[allow(clippy::expect_used)]
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<tr[^>]*>\s*((?:<td[^>]*>.*?</td>\s*){5})</tr>").expect("row pattern must compile")
});

#[allow(clippy::expect_used)]
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("cell pattern must compile"));

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern must compile"));

/// Ingestion statistics for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantStats {
    /// Tenant id.
    pub user: String,
    /// Number of active series.
    pub series: u64,
    /// Samples per second, all sources.
    pub ingest_rate: f64,
    /// Samples per second received through the push API.
    pub api_ingest_rate: f64,
    /// Samples per second produced by rules.
    pub rule_ingest_rate: f64,
}

/// Parses the statistics table.
///
/// Header rows (`<th>`) are skipped.
///
/// # Errors
///
/// Returns an error if a numeric cell does not parse.
pub fn parse_user_stats(html: &str) -> Result<Vec<TenantStats>> {
    let mut stats = Vec::new();

    for row in ROW.captures_iter(html) {
        let cells: Vec<String> = CELL
            .captures_iter(&row[1])
            .map(|c| TAG.replace_all(&c[1], "").trim().to_string())
            .collect();
        let [user, series, ingest, api, rule] = cells.as_slice() else {
            continue;
        };

        stats.push(TenantStats {
            user: user.clone(),
            series: number("series", series)?,
            ingest_rate: number("ingest rate", ingest)?,
            api_ingest_rate: number("API ingest rate", api)?,
            rule_ingest_rate: number("rule ingest rate", rule)?,
        });
    }

    Ok(stats)
}

fn number<T: std::str::FromStr>(what: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ApiError::InvalidResponse {
            message: format!("invalid {what} '{value}' in distributor stats"),
        }
        .into()
    })
}

impl MimirClient {
    /// Fetches per-tenant ingestion statistics from the distributor.
    ///
    /// # Errors
    ///
    /// Returns any transport error or a malformed table.
    pub async fn user_stats(&self) -> Result<Vec<TenantStats>> {
        let body = self
            .send_request(Component::Distributor, Method::GET, STATS_PATH, None, &HeaderMap::new())
            .await?;
        parse_user_stats(&body)
    }
}
