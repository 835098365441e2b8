//! Report run orchestration: fetch, render, deliver.
//!
//! A run fetches today's sales and yesterday's exchange rate, appends one
//! sheet to the workbook, saves it and mails the file. A day without sales
//! ends the run early without touching the workbook.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::delivery::Delivery;
use crate::models::ExchangeRate;
use crate::sources::{RateSource, SalesSource};
use crate::workbook::{ReportWorkbook, COL_CUMULATIVE_TOTAL, COL_DAILY_AVERAGE};
use crate::workbook::formula::column_letter;

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The backend had no sales for the day; nothing was written or sent
    NoSales,
    Delivered {
        sheet: String,
        rows: usize,
        rate: ExchangeRate,
    },
}

pub struct ReportDispatcher<S, R, D> {
    sales: S,
    rates: R,
    delivery: D,
    workbook_path: PathBuf,
    recipient: String,
}

impl<S, R, D> ReportDispatcher<S, R, D>
where
    S: SalesSource,
    R: RateSource,
    D: Delivery,
{
    pub fn new(
        sales: S,
        rates: R,
        delivery: D,
        workbook_path: impl Into<PathBuf>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            sales,
            rates,
            delivery,
            workbook_path: workbook_path.into(),
            recipient: recipient.into(),
        }
    }

    /// Run one report cycle for `today`. Errors are logged before being returned.
    pub fn run(&self, today: NaiveDate) -> Result<RunOutcome> {
        self.generate(today).inspect_err(|e| {
            error!("Report generation failed: {:#}", e);
        })
    }

    fn generate(&self, today: NaiveDate) -> Result<RunOutcome> {
        let yesterday = today - Duration::days(1);

        let sales = self
            .sales
            .get_sales(today)
            .with_context(|| format!("Failed to fetch sales for {}", today))?;
        let rate = self.rates.get_rate(yesterday);

        if sales.is_empty() {
            warn!("No sales to report for {}", today);
            return Ok(RunOutcome::NoSales);
        }

        let mut workbook = ReportWorkbook::open(&self.workbook_path)?;
        let sheet = workbook.add_daily_sheet(today, &sales, rate)?;
        log_totals(&workbook, &sheet);
        workbook.save()?;

        self.delivery
            .send_report(&self.recipient, workbook.path(), today)
            .with_context(|| format!("Failed to deliver report to {}", self.recipient))?;

        info!("Report for {} delivered ({} sales, sheet {})", today, sales.len(), sheet);
        Ok(RunOutcome::Delivered {
            sheet,
            rows: sales.len(),
            rate,
        })
    }
}

fn log_totals(workbook: &ReportWorkbook, sheet: &str) {
    let Some(sheet) = workbook.sheet(sheet) else {
        return;
    };
    let show = |col: usize| match sheet.evaluate(&format!("{}2", column_letter(col))) {
        Ok(value) => value.round_dp(2).to_string(),
        Err(e) => e.to_string(),
    };
    info!(
        "Sheet {}: cumulative total {}, daily average {}",
        sheet.name(),
        show(COL_CUMULATIVE_TOTAL),
        show(COL_DAILY_AVERAGE)
    );
}
