use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, FormatBorder, Workbook, Worksheet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{CellValue, ReportSheet};

/// Read every sheet of an xlsx file, keeping formula text where present
pub(super) fn load(path: &Path) -> Result<Vec<ReportSheet>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let names = workbook.sheet_names().to_owned();
    let mut sheets = Vec::with_capacity(names.len());

    for name in names {
        let values = workbook
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read sheet '{}'", name))?;
        let formulas = workbook
            .worksheet_formula(&name)
            .with_context(|| format!("Failed to read formulas of sheet '{}'", name))?;

        let mut grid: Vec<Vec<CellValue>> = Vec::new();

        // Ranges may not begin at A1
        if let Some((start_row, start_col)) = values.start() {
            for (row_idx, row) in values.rows().enumerate() {
                for (col_idx, cell) in row.iter().enumerate() {
                    put(
                        &mut grid,
                        start_row as usize + row_idx,
                        start_col as usize + col_idx,
                        data_to_cell(cell),
                    );
                }
            }
        }

        if let Some((start_row, start_col)) = formulas.start() {
            for (row_idx, row) in formulas.rows().enumerate() {
                for (col_idx, formula) in row.iter().enumerate() {
                    if formula.is_empty() {
                        continue;
                    }
                    let text = if formula.starts_with('=') {
                        formula.clone()
                    } else {
                        format!("={}", formula)
                    };
                    put(
                        &mut grid,
                        start_row as usize + row_idx,
                        start_col as usize + col_idx,
                        CellValue::Formula(text),
                    );
                }
            }
        }

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut grid {
            row.resize(width, CellValue::Empty);
        }

        debug!("Loaded sheet '{}' ({} rows)", name, grid.len());
        sheets.push(ReportSheet::from_rows(name, grid));
    }

    Ok(sheets)
}

fn put(grid: &mut Vec<Vec<CellValue>>, row: usize, col: usize, value: CellValue) {
    if value.is_empty() && grid.get(row).map_or(true, |r| r.len() <= col) {
        return;
    }
    if grid.len() <= row {
        grid.resize_with(row + 1, Vec::new);
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        cells.resize(col + 1, CellValue::Empty);
    }
    cells[col] = value;
}

fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(Decimal::from(*i)),
        Data::Float(f) => Decimal::from_f64(*f)
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(f.to_string())),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) => iso_to_serial(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        other => CellValue::Text(other.to_string()),
    }
}

/// Excel serial for an ISO 8601 date or date-time (1900 date system)
fn iso_to_serial(s: &str) -> Option<f64> {
    let dt = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))?;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    Some((dt - epoch).num_milliseconds() as f64 / 86_400_000.0)
}

/// Number format that keeps a serial readable as the kind of date it holds
fn date_num_format(serial: f64) -> &'static str {
    let has_date = serial.trunc() != 0.0;
    let has_time = serial.fract().abs() > 1e-9;
    match (has_date, has_time) {
        (true, true) => "yyyy-mm-dd hh:mm:ss",
        (false, true) => "hh:mm:ss",
        _ => "yyyy-mm-dd",
    }
}

/// Write all sheets to `path` through a sibling temp file and rename it into place.
///
/// Rows below the header get a thick border on every cell.
pub(super) fn save(path: &Path, sheets: &[ReportSheet]) -> Result<()> {
    let mut workbook = Workbook::new();
    let border = Format::new().set_border(FormatBorder::Thick);

    for sheet in sheets {
        let worksheet = workbook
            .add_worksheet()
            .set_name(sheet.name())
            .with_context(|| format!("Failed to create sheet '{}'", sheet.name()))?;

        for (row_idx, row) in sheet.rows().iter().enumerate() {
            let format = (row_idx > 0).then_some(&border);
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(worksheet, row_idx as u32, col_idx as u16, cell, format)
                    .with_context(|| {
                        format!(
                            "Failed to write cell ({}, {}) of sheet '{}'",
                            row_idx, col_idx, sheet.name()
                        )
                    })?;
            }
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    replace_atomically(path, |tmp_path| {
        workbook
            .save(tmp_path)
            .with_context(|| format!("Failed to write workbook {}", tmp_path.display()))
    })
}

/// Run `write` against a sibling temp file, then rename it over `path`.
///
/// On any failure the temp file is removed and `path` is left as it was.
fn replace_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp_path = temp_path(path)?;
    let result = write(&tmp_path).and_then(|()| {
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to finalize workbook {}", path.display()))
    });
    if result.is_err() && tmp_path.exists() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("Could not remove temp file {}: {}", tmp_path.display(), e);
        }
    }
    result
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    format: Option<&Format>,
) -> Result<()> {
    match (cell, format) {
        (CellValue::Empty, Some(format)) => {
            worksheet.write_blank(row, col, format)?;
        }
        (CellValue::Empty, None) => {}
        (CellValue::Text(s), Some(format)) => {
            worksheet.write_string_with_format(row, col, s, format)?;
        }
        (CellValue::Text(s), None) => {
            worksheet.write_string(row, col, s)?;
        }
        (CellValue::Bool(b), Some(format)) => {
            worksheet.write_boolean_with_format(row, col, *b, format)?;
        }
        (CellValue::Bool(b), None) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        (CellValue::DateTime(serial), format) => {
            let format = format
                .cloned()
                .unwrap_or_default()
                .set_num_format(date_num_format(*serial));
            worksheet.write_number_with_format(row, col, *serial, &format)?;
        }
        (CellValue::Number(n), format) => {
            let value = n
                .to_f64()
                .ok_or_else(|| anyhow!("Number out of range: {}", n))?;
            match format {
                Some(format) => worksheet.write_number_with_format(row, col, value, format)?,
                None => worksheet.write_number(row, col, value)?,
            };
        }
        (CellValue::Formula(f), format) => {
            let body = f.strip_prefix('=').unwrap_or(f);
            match format {
                Some(format) => worksheet.write_formula_with_format(row, col, body, format)?,
                None => worksheet.write_formula(row, col, body)?,
            };
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Workbook path has no file name: {}", path.display()))?;
    Ok(path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/reports/daily_sales.xlsx")).unwrap();
        assert_eq!(tmp, PathBuf::from("/reports/.daily_sales.xlsx.tmp"));
        assert!(temp_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_put_pads_rows() {
        let mut grid = Vec::new();
        put(&mut grid, 1, 2, CellValue::Text("x".into()));
        assert_eq!(grid.len(), 2);
        assert!(grid[0].is_empty());
        assert_eq!(grid[1], vec![CellValue::Empty, CellValue::Empty, CellValue::Text("x".into())]);
    }

    #[test]
    fn test_data_to_cell_conversions() {
        assert_eq!(data_to_cell(&Data::Empty), CellValue::Empty);
        assert_eq!(data_to_cell(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(data_to_cell(&Data::Int(5)), CellValue::Number(Decimal::from(5)));
        assert_eq!(
            data_to_cell(&Data::Float(0.1)),
            CellValue::Number(Decimal::from_str_exact("0.1").unwrap())
        );
        assert_eq!(data_to_cell(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(
            data_to_cell(&Data::DateTimeIso("2024-01-01".into())),
            CellValue::DateTime(45292.0)
        );
        assert_eq!(
            data_to_cell(&Data::DateTimeIso("2024-01-01T12:00:00".into())),
            CellValue::DateTime(45292.5)
        );
        assert_eq!(
            data_to_cell(&Data::DateTimeIso("soon".into())),
            CellValue::Text("soon".into())
        );
    }

    #[test]
    fn test_date_num_format_follows_serial() {
        assert_eq!(date_num_format(45292.0), "yyyy-mm-dd");
        assert_eq!(date_num_format(45292.25), "yyyy-mm-dd hh:mm:ss");
        assert_eq!(date_num_format(0.5), "hh:mm:ss");
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("daily_sales.xlsx");
        fs::write(&path, b"previous").unwrap();

        let err = replace_atomically(&path, |tmp| {
            fs::write(tmp, b"half a workbook")?;
            Err(anyhow!("disk full"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert!(!temp_path(&path).unwrap().exists());
        assert_eq!(fs::read(&path).unwrap(), b"previous");
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        // A non-empty directory cannot be replaced by a file
        let path = dir.path().join("daily_sales.xlsx");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let err = replace_atomically(&path, |tmp| Ok(fs::write(tmp, b"workbook")?)).unwrap_err();

        assert!(err.to_string().contains("Failed to finalize workbook"));
        assert!(!temp_path(&path).unwrap().exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_successful_write_replaces_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("daily_sales.xlsx");
        fs::write(&path, b"previous").unwrap();

        replace_atomically(&path, |tmp| Ok(fs::write(tmp, b"next")?)).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"next");
        assert!(!temp_path(&path).unwrap().exists());
    }
}
