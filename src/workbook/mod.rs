//! Persistent sales workbook with one dated sheet per report run.
//!
//! Every sheet shares a fixed seven-column layout. The local-currency column
//! and the two summary cells are stored as live formulas so the file can be
//! audited and adjusted later without regenerating it.

pub mod formula;
mod xlsx;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::models::{ExchangeRate, SaleRecord};
pub use formula::{FormulaError, FormulaResult};

/// Header row shared by every report sheet
pub const HEADER: [&str; 7] = [
    "Client",
    "Products",
    "Amount (USD)",
    "Date",
    "Amount (local)",
    "Daily Average",
    "Cumulative Total",
];

pub const COL_CLIENT: usize = 0;
pub const COL_PRODUCTS: usize = 1;
pub const COL_AMOUNT: usize = 2;
pub const COL_DATE: usize = 3;
pub const COL_LOCAL_AMOUNT: usize = 4;
pub const COL_DAILY_AVERAGE: usize = 5;
pub const COL_CUMULATIVE_TOTAL: usize = 6;

/// 1-based row holding the first sale and both summary cells
const FIRST_DATA_ROW: usize = 2;
/// Excel caps sheet names at 31 characters
const MAX_SHEET_NAME_LEN: usize = 31;

/// Contents of one cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(Decimal),
    Bool(bool),
    /// Excel serial date: days since 1899-12-30, fraction is the time of day
    DateTime(f64),
    /// Formula text including the leading `=`
    Formula(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_formula(&self) -> Option<&str> {
        match self {
            CellValue::Formula(f) => Some(f),
            _ => None,
        }
    }
}

/// A named page of the workbook
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSheet {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

impl ReportSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of rows below the header
    pub fn data_row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    /// Cell at zero-based coordinates
    pub fn cell_at(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Cell at an A1-style address
    pub fn cell(&self, address: &str) -> Option<&CellValue> {
        let (row, col) = formula::parse_cell_ref(address)?;
        self.cell_at(row, col)
    }

    /// Evaluate the cell at an A1-style address
    pub fn evaluate(&self, address: &str) -> FormulaResult {
        let cell = self.cell(address).cloned().unwrap_or(CellValue::Empty);
        match cell {
            CellValue::Formula(f) => formula::evaluate(self, &f),
            CellValue::Text(_) => Err(FormulaError::Value),
            other => formula::scalar(&other),
        }
    }

    fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, CellValue::Empty);
            }
            cells[col] = value;
        }
    }
}

/// Workbook loaded from and saved to a single xlsx path
#[derive(Debug)]
pub struct ReportWorkbook {
    path: PathBuf,
    sheets: Vec<ReportSheet>,
}

impl ReportWorkbook {
    /// Load the workbook at `path`, or start an empty one if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sheets = if path.exists() {
            let sheets = xlsx::load(&path)?;
            info!("Loaded workbook {} ({} sheets)", path.display(), sheets.len());
            sheets
        } else {
            info!("Workbook {} not found, starting a new one", path.display());
            Vec::new()
        };
        Ok(Self { path, sheets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheets(&self) -> &[ReportSheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&ReportSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Append a sheet for `date` holding `sales` converted at `rate`.
    ///
    /// Returns the sheet name actually used: a date that already has a sheet
    /// gets a ` (2)`, ` (3)`, ... suffix.
    pub fn add_daily_sheet(
        &mut self,
        date: NaiveDate,
        sales: &[SaleRecord],
        rate: ExchangeRate,
    ) -> Result<String> {
        if sales.is_empty() {
            return Err(ReportError::Workbook("no sales to render".to_string()).into());
        }

        let name = self.unique_sheet_name(&date.format("%Y-%m-%d").to_string())?;
        let mut sheet = ReportSheet::new(name.clone());
        sheet.push_row(HEADER.iter().map(|h| CellValue::Text(h.to_string())).collect());

        for (i, sale) in sales.iter().enumerate() {
            let row = FIRST_DATA_ROW + i;
            sheet.push_row(vec![
                CellValue::Text(sale.client.clone()),
                CellValue::Text(sale.products.label()),
                CellValue::Number(sale.amount),
                CellValue::Text(sale.date.format("%Y-%m-%d").to_string()),
                CellValue::Formula(local_amount_formula(row, rate)),
                CellValue::Empty,
                CellValue::Empty,
            ]);
        }

        if rate.is_none() {
            warn!("No exchange rate for sheet {}; local amounts will show #N/A", name);
        }

        self.sheets.push(sheet);
        self.calculate_financials(&name);
        debug!("Added sheet {} with {} sales", name, sales.len());
        Ok(name)
    }

    /// Fill the Daily Average and Cumulative Total formulas of sheet `name`.
    ///
    /// The average divides by the number of other sheets in the workbook, so the
    /// very first sheet divides by zero.
    fn calculate_financials(&mut self, name: &str) {
        let days_count = self.sheets.iter().filter(|s| s.name != name).count();
        if days_count == 0 {
            warn!("Sheet {} is the first in the workbook; daily average divides by zero", name);
        }

        let Some(sheet) = self.sheets.iter_mut().find(|s| s.name == name) else {
            return;
        };
        let last_row = sheet.rows.len();
        let local = formula::column_letter(COL_LOCAL_AMOUNT);
        let local_sum = format!("SUM({local}{FIRST_DATA_ROW}:{local}{last_row})");

        let summary_row = FIRST_DATA_ROW - 1;
        sheet.set(
            summary_row,
            COL_DAILY_AVERAGE,
            CellValue::Formula(format!("={}/{}", local_sum, days_count)),
        );
        sheet.set(
            summary_row,
            COL_CUMULATIVE_TOTAL,
            CellValue::Formula(format!("={}", local_sum)),
        );
    }

    fn unique_sheet_name(&self, base: &str) -> Result<String> {
        let taken = |candidate: &str| self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(candidate));
        if !taken(base) {
            return Ok(base.to_string());
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{} ({})", base, n);
            if candidate.chars().count() > MAX_SHEET_NAME_LEN {
                return Err(ReportError::Workbook(format!(
                    "no free sheet name left for {}",
                    base
                ))
                .into());
            }
            if !taken(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Write every sheet back to the workbook path, replacing the previous file
    pub fn save(&self) -> Result<()> {
        xlsx::save(&self.path, &self.sheets)?;
        info!("Saved workbook {} ({} sheets)", self.path.display(), self.sheets.len());
        Ok(())
    }
}

/// `=C{row}*{rate}`, or a `NA()` multiplier when the rate is unknown
fn local_amount_formula(row: usize, rate: ExchangeRate) -> String {
    let amount = format!("{}{}", formula::column_letter(COL_AMOUNT), row);
    match rate {
        Some(rate) => format!("={}*{}", amount, rate.normalize()),
        None => format!("={}*NA()", amount),
    }
}
