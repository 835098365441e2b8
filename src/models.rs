//! Domain records exchanged between the fetch adapters and the workbook.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange rate for one report run. `None` when the quote lookup failed.
pub type ExchangeRate = Option<Decimal>;

/// One sale as exported by the sales backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub client: String,
    pub products: Products,
    /// Amount in the source currency (USD)
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// Products sold, either a free-form label or a list of product names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Products {
    Label(String),
    List(Vec<String>),
}

impl Products {
    /// Text written into the Products column
    pub fn label(&self) -> String {
        match self {
            Products::Label(s) => s.clone(),
            Products::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for Products {
    fn from(value: &str) -> Self {
        Products::Label(value.to_string())
    }
}
