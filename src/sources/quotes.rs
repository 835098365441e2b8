use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::Url;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{error, info};

use super::{date_param, fetch_error, RateSource, USER_AGENT};
use crate::config::QuotesConfig;
use crate::models::ExchangeRate;

const AVERAGE_FIELD: &str = "value_avg";

/// Quote service returning `{ "<kind>": { "value_avg": <number> }, ... }`
pub struct HttpRateSource {
    client: Client,
    endpoint: String,
    kind: String,
}

impl HttpRateSource {
    pub fn new(config: &QuotesConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .context("Failed to build quote service HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            kind: config.kind.clone(),
        })
    }

    fn fetch_rate(&self, date: NaiveDate) -> Result<Decimal> {
        let url = Url::parse_with_params(&self.endpoint, &[("date", date_param(date))])
            .with_context(|| format!("Invalid quote service URL: {}", self.endpoint))?;

        let body: Value = self
            .client
            .get(url)
            .send()
            .map_err(fetch_error)
            .context("Failed to send request to quote service")?
            .error_for_status()
            .map_err(fetch_error)
            .context("Quote service returned error status")?
            .json()
            .map_err(fetch_error)
            .context("Failed to parse quote service response")?;

        extract_average(&body, &self.kind)
    }
}

/// Pull `<kind>.value_avg` out of a quote body
fn extract_average(body: &Value, kind: &str) -> Result<Decimal> {
    let raw = body
        .get(kind)
        .and_then(|quote| quote.get(AVERAGE_FIELD))
        .ok_or_else(|| anyhow!("Quote response has no {}.{}", kind, AVERAGE_FIELD))?;

    match raw {
        Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| anyhow!("Quote value out of range: {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<Decimal>()
            .with_context(|| format!("Quote value is not numeric: {}", s)),
        other => Err(anyhow!("Quote value is not numeric: {}", other)),
    }
}

impl RateSource for HttpRateSource {
    fn get_rate(&self, date: NaiveDate) -> ExchangeRate {
        match self.fetch_rate(date) {
            Ok(rate) => {
                info!("Exchange rate for {} ({}): {}", date, self.kind, rate);
                Some(rate)
            }
            Err(e) => {
                error!("Exchange rate lookup failed for {}: {:#}", date, e);
                None
            }
        }
    }
}
