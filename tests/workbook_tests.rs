//! Workbook persistence tests
//!
//! These tests verify the on-disk behaviour of the report workbook:
//! - Reload preserves sheet names, cell contents and formula text
//! - Sheets from earlier runs are carried forward untouched
//! - Daily average denominators across sequential runs
//! - Borders and formulas survive in the written xlsx
//! - Date and boolean cells of earlier sheets keep their types

use anyhow::Result;
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::NaiveDate;
use daily_report::models::{Products, SaleRecord};
use daily_report::workbook::{CellValue, FormulaError, ReportWorkbook};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use tempfile::TempDir;

fn workbook_path() -> Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let path = dir.path().join("daily_sales.xlsx");
    Ok((dir, path))
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn sale(client: &str, products: Products, amount: Decimal, date: NaiveDate) -> SaleRecord {
    SaleRecord {
        client: client.to_string(),
        products,
        amount,
        date,
    }
}

fn formula_at<'a>(wb: &'a ReportWorkbook, sheet: &str, cell: &str) -> Option<&'a str> {
    wb.sheet(sheet)?.cell(cell)?.as_formula()
}

#[test]
fn test_missing_file_opens_empty() -> Result<()> {
    let (_dir, path) = workbook_path()?;
    let wb = ReportWorkbook::open(&path)?;
    assert!(wb.sheets().is_empty());
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_single_sale_scenario_survives_reload() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    let mut wb = ReportWorkbook::open(&path)?;
    let name = wb.add_daily_sheet(
        day(1),
        &[sale("A", Products::from("X"), dec!(100), day(1))],
        Some(dec!(1000)),
    )?;
    wb.save()?;

    let reloaded = ReportWorkbook::open(&path)?;
    assert_eq!(reloaded.sheet_names(), vec!["2024-01-01"]);
    assert_eq!(formula_at(&reloaded, &name, "E2"), Some("=C2*1000"));
    assert_eq!(formula_at(&reloaded, &name, "F2"), Some("=SUM(E2:E2)/0"));
    assert_eq!(formula_at(&reloaded, &name, "G2"), Some("=SUM(E2:E2)"));

    let sheet = reloaded.sheet(&name).unwrap();
    assert_eq!(sheet.evaluate("E2"), Ok(dec!(100000)));
    assert_eq!(sheet.evaluate("F2"), Err(FormulaError::DivByZero));
    assert_eq!(sheet.evaluate("G2"), Ok(dec!(100000)));
    Ok(())
}

#[test]
fn test_save_and_reload_is_lossless() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    let mut wb = ReportWorkbook::open(&path)?;
    wb.add_daily_sheet(
        day(1),
        &[
            sale("ACME", Products::List(vec!["Bolt".into(), "Nut".into()]), dec!(12.5), day(1)),
            sale("Globex", Products::from("Widget"), dec!(0.1), day(1)),
            sale("Initech", Products::from("Stapler"), dec!(1999), day(1)),
        ],
        Some(dec!(987.65)),
    )?;
    wb.add_daily_sheet(day(2), &[sale("ACME", Products::from("Bolt"), dec!(3), day(2))], None)?;
    wb.save()?;

    let reloaded = ReportWorkbook::open(&path)?;
    assert_eq!(reloaded.sheets(), wb.sheets());
    Ok(())
}

#[test]
fn test_consecutive_runs_append_and_count_prior_sheets() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    let mut first = ReportWorkbook::open(&path)?;
    first.add_daily_sheet(day(1), &[sale("A", Products::from("X"), dec!(100), day(1))], Some(dec!(1000)))?;
    first.save()?;

    let mut second = ReportWorkbook::open(&path)?;
    let name = second.add_daily_sheet(
        day(2),
        &[
            sale("B", Products::from("Y"), dec!(10), day(2)),
            sale("C", Products::from("Z"), dec!(30), day(2)),
        ],
        Some(dec!(1100)),
    )?;
    second.save()?;

    let reloaded = ReportWorkbook::open(&path)?;
    assert_eq!(reloaded.sheet_names(), vec!["2024-01-01", "2024-01-02"]);

    // Earlier sheet untouched
    assert_eq!(reloaded.sheet("2024-01-01"), first.sheet("2024-01-01"));

    assert_eq!(formula_at(&reloaded, &name, "F2"), Some("=SUM(E2:E3)/1"));
    let sheet = reloaded.sheet(&name).unwrap();
    assert_eq!(sheet.evaluate("G2"), Ok(dec!(44000)));
    assert_eq!(sheet.evaluate("F2"), Ok(dec!(44000)));
    Ok(())
}

#[test]
fn test_rerun_same_day_adds_suffixed_sheet_on_disk() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    for _ in 0..2 {
        let mut wb = ReportWorkbook::open(&path)?;
        wb.add_daily_sheet(day(7), &[sale("A", Products::from("X"), dec!(1), day(7))], Some(dec!(2)))?;
        wb.save()?;
    }

    let reloaded = ReportWorkbook::open(&path)?;
    assert_eq!(reloaded.sheet_names(), vec!["2024-01-07", "2024-01-07 (2)"]);
    Ok(())
}

#[test]
fn test_written_file_keeps_live_formulas() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    let mut wb = ReportWorkbook::open(&path)?;
    wb.add_daily_sheet(day(1), &[sale("A", Products::from("X"), dec!(4), day(1))], Some(dec!(5)))?;
    wb.save()?;

    let mut xlsx: Xlsx<_> = open_workbook(&path)?;
    let formulas = xlsx.worksheet_formula("2024-01-01")?;
    let texts: Vec<String> = formulas
        .rows()
        .flat_map(|row| row.iter().filter(|f| !f.is_empty()).cloned().collect::<Vec<_>>())
        .collect();
    assert_eq!(texts, vec!["C2*5", "SUM(E2:E2)/0", "SUM(E2:E2)"]);
    Ok(())
}

#[test]
fn test_save_leaves_no_temp_file() -> Result<()> {
    let (dir, path) = workbook_path()?;

    let mut wb = ReportWorkbook::open(&path)?;
    wb.add_daily_sheet(day(1), &[sale("A", Products::from("X"), dec!(1), day(1))], Some(dec!(1)))?;
    wb.save()?;

    let entries: Vec<String> = std::fs::read_dir(dir.path())?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(entries, vec!["daily_sales.xlsx"]);
    Ok(())
}

#[test]
fn test_loaded_cells_keep_types() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    let mut wb = ReportWorkbook::open(&path)?;
    wb.add_daily_sheet(day(3), &[sale("A", Products::from("X"), dec!(42), day(2))], Some(dec!(1)))?;
    wb.save()?;

    let reloaded = ReportWorkbook::open(&path)?;
    let sheet = reloaded.sheet("2024-01-03").unwrap();
    assert_eq!(sheet.cell("C1"), Some(&CellValue::Text("Amount (USD)".into())));
    assert_eq!(sheet.cell("C2"), Some(&CellValue::Number(dec!(42))));
    assert_eq!(sheet.cell("D2"), Some(&CellValue::Text("2024-01-02".into())));
    assert_eq!(sheet.cell("F3"), None);
    Ok(())
}

#[test]
fn test_earlier_sheet_keeps_dates_and_booleans() -> Result<()> {
    let (_dir, path) = workbook_path()?;

    // An earlier sheet edited by hand: a real date cell and a checkbox-style flag
    let mut edited = rust_xlsxwriter::Workbook::new();
    let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd");
    let stamp_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    let sheet = edited.add_worksheet().set_name("2024-01-01")?;
    sheet.write_string(0, 0, "Client")?;
    sheet.write_boolean(1, 0, true)?;
    sheet.write_number(1, 2, 10.0)?;
    sheet.write_number_with_format(1, 3, 45292.0, &date_format)?;
    sheet.write_number_with_format(2, 3, 45292.75, &stamp_format)?;
    edited.save(&path)?;

    let mut wb = ReportWorkbook::open(&path)?;
    assert_eq!(wb.sheet("2024-01-01").unwrap().cell("A2"), Some(&CellValue::Bool(true)));
    wb.add_daily_sheet(day(2), &[sale("A", Products::from("X"), dec!(1), day(2))], Some(dec!(2)))?;
    wb.save()?;

    let mut xlsx: Xlsx<_> = open_workbook(&path)?;
    let range = xlsx.worksheet_range("2024-01-01")?;
    assert_eq!(range.get_value((1, 0)), Some(&Data::Bool(true)));
    assert_eq!(range.get_value((1, 2)), Some(&Data::Float(10.0)));
    match range.get_value((1, 3)) {
        Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 45292.0),
        other => panic!("D2 should stay a date, got {:?}", other),
    }
    match range.get_value((2, 3)) {
        Some(Data::DateTime(dt)) => assert_eq!(dt.as_f64(), 45292.75),
        other => panic!("D3 should stay a date-time, got {:?}", other),
    }

    let reloaded = ReportWorkbook::open(&path)?;
    let earlier = reloaded.sheet("2024-01-01").unwrap();
    assert_eq!(earlier.cell("D2"), Some(&CellValue::DateTime(45292.0)));
    assert_eq!(earlier.cell("A2"), Some(&CellValue::Bool(true)));
    Ok(())
}
