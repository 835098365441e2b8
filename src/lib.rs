//! Daily sales report
//!
//! Pulls the day's sales from the sales backend, converts them with the
//! previous day's exchange rate into a persistent multi-sheet workbook, and
//! mails the file to a fixed recipient.

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod sources;
pub mod workbook;
