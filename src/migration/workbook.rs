// src/migration/workbook.rs

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Reader};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

use super::grid::SheetGrid;
use super::normalize::FlowRecord;

pub const OUTPUT_COLUMNS: [&str; 4] = ["Moved To: State", "Moved From: State", "Estimate", "MOE"];

/// Load the first worksheet of an `.xls`/`.xlsx` file.
pub fn read_grid(path: &Path) -> Result<SheetGrid> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("{} contains no worksheets", path.display()))?
        .with_context(|| format!("reading first worksheet of {}", path.display()))?;
    Ok(SheetGrid::from_range(&range))
}

/// Name of the cleaned output for a raw file: `"table"` becomes `"dataframe"`
/// in the base name, and the extension becomes `.xlsx`.
pub fn cleaned_file_name(source: &Path) -> Option<String> {
    let stem = source.file_stem()?.to_str()?;
    Some(format!("{}.xlsx", stem.replace("table", "dataframe")))
}

/// Write `records` to a single-sheet workbook at `path`, replacing any
/// existing file.
pub fn write_flows(records: &[FlowRecord], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();

    for (col, name) in OUTPUT_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &bold)?;
    }
    for (i, r) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, r.destination.as_str())?;
        sheet.write_string(row, 1, r.origin.as_str())?;
        sheet.write_number(row, 2, r.estimate)?;
        sheet.write_number(row, 3, r.margin_of_error)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::grid::Cell;
    use tempfile::tempdir;

    #[test]
    fn cleaned_name_swaps_table_for_dataframe() {
        assert_eq!(
            cleaned_file_name(Path::new("raw/state_to_state_migrations_table_2019.xls")).as_deref(),
            Some("state_to_state_migrations_dataframe_2019.xlsx")
        );
        assert_eq!(
            cleaned_file_name(Path::new("state_to_state_migrations_2005.xls")).as_deref(),
            Some("state_to_state_migrations_2005.xlsx")
        );
    }

    #[test]
    fn written_flows_read_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("flows.xlsx");
        let records = vec![
            FlowRecord {
                destination: "Alabama".into(),
                origin: "Alaska".into(),
                estimate: 120.0,
                margin_of_error: 15.0,
            },
            FlowRecord {
                destination: "Alaska".into(),
                origin: "Alabama".into(),
                estimate: 80.0,
                margin_of_error: 10.0,
            },
        ];

        write_flows(&records, &path)?;
        let grid = read_grid(&path)?;

        assert_eq!(grid.height(), 3);
        for (col, name) in OUTPUT_COLUMNS.iter().enumerate() {
            assert_eq!(grid.cell(0, col).label().as_deref(), Some(*name));
        }
        assert_eq!(grid.cell(1, 0).label().as_deref(), Some("Alabama"));
        assert_eq!(grid.cell(2, 1).label().as_deref(), Some("Alabama"));
        assert_eq!(grid.cell(1, 2), &Cell::Number(120.0));
        assert_eq!(grid.cell(2, 3), &Cell::Number(10.0));
        Ok(())
    }
}
