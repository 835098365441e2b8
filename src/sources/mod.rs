// Sources module - HTTP adapters for the sales backend and the quote service

pub mod quotes;
pub mod sales;

use chrono::NaiveDate;

use crate::error::{ReportError, Result};
use crate::models::{ExchangeRate, SaleRecord};

pub use quotes::HttpRateSource;
pub use sales::HttpSalesSource;

const USER_AGENT: &str = concat!("daily-report/", env!("CARGO_PKG_VERSION"));

/// Provides the sales recorded on a given day.
///
/// Transport failures are errors; a day without sales is `Ok(vec![])`.
pub trait SalesSource {
    fn get_sales(&self, date: NaiveDate) -> Result<Vec<SaleRecord>>;
}

/// Provides the exchange rate for a given day.
///
/// Never fails: implementations log the problem and return `None`.
pub trait RateSource {
    fn get_rate(&self, date: NaiveDate) -> ExchangeRate;
}

/// Query-string form of a date expected by both services
fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn fetch_error(e: reqwest::Error) -> ReportError {
    ReportError::Fetch(e.to_string())
}
