use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use super::{date_param, fetch_error, SalesSource, USER_AGENT};
use crate::config::SalesConfig;
use crate::models::SaleRecord;

const EXPORT_PATH: &str = "export_daily_sales";

/// Body returned by the backend export endpoint
#[derive(Debug, Deserialize)]
struct SalesExportResponse {
    #[serde(default)]
    sales: Option<Vec<SaleRecord>>,
}

/// Sales backend reached over HTTP
pub struct HttpSalesSource {
    client: Client,
    base_url: String,
}

impl HttpSalesSource {
    pub fn new(config: &SalesConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .context("Failed to build sales backend HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn export_url(&self, date: NaiveDate) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, EXPORT_PATH);
        Url::parse_with_params(&raw, &[("date", date_param(date))])
            .with_context(|| format!("Invalid sales backend URL: {}", raw))
    }
}

impl SalesSource for HttpSalesSource {
    fn get_sales(&self, date: NaiveDate) -> Result<Vec<SaleRecord>> {
        let url = self.export_url(date)?;
        info!("Fetching sales for {} from {}", date, self.base_url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(fetch_error)
            .context("Failed to send request to sales backend")?
            .error_for_status()
            .map_err(fetch_error)
            .context("Sales backend returned error status")?;

        let body: SalesExportResponse = response
            .json()
            .map_err(fetch_error)
            .context("Failed to parse sales backend response")?;

        let sales = body.sales.unwrap_or_default();
        debug!("Sales backend returned {} records for {}", sales.len(), date);
        Ok(sales)
    }
}
