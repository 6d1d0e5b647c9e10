//! Template importer implementation - Excel (.xlsx) → TemplateWorkbook
//!
//! calamine builds the grid used for keyword discovery; the raw package is
//! kept next to it so the export can patch the original file in place.

use super::grid::{CellRef, CellValue, MergedRange, SheetGrid};
use super::package::TemplatePackage;
use super::workbook::{Sheet, TemplateWorkbook};
use crate::error::ExportError;
use calamine::{Data, Range, Reader, Xlsx};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads an xlsx template into the exporter's grid model
pub struct TemplateImporter {
    path: PathBuf,
}

impl TemplateImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open the template file; a missing file is [`ExportError::TemplateNotFound`]
    pub fn import(&self) -> Result<(TemplateWorkbook, TemplatePackage), ExportError> {
        if !self.path.is_file() {
            return Err(ExportError::TemplateNotFound(self.path.clone()));
        }

        let bytes = std::fs::read(&self.path)
            .map_err(|e| ExportError::unexpected("failed to read template", &e))?;
        let package = TemplatePackage::from_bytes(&bytes)?;
        let workbook = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| ExportError::unexpected("failed to open template", &e))?;
        let workbook = read_workbook(workbook)?.with_active(package.active_sheet());
        Ok((workbook, package))
    }

    /// Parse an xlsx held in memory (used to inspect generated output)
    pub fn from_bytes(bytes: Vec<u8>) -> Result<TemplateWorkbook, ExportError> {
        let active = TemplatePackage::from_bytes(&bytes)?.active_sheet();
        let workbook = Xlsx::new(Cursor::new(bytes))
            .map_err(|e| ExportError::unexpected("failed to read workbook", &e))?;
        Ok(read_workbook(workbook)?.with_active(active))
    }
}

fn read_workbook<RS: Read + Seek>(mut workbook: Xlsx<RS>) -> Result<TemplateWorkbook, ExportError> {
    let sheet_names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for name in sheet_names {
        let mut grid = SheetGrid::new();

        let values = workbook
            .worksheet_range(&name)
            .map_err(|e| ExportError::unexpected(&format!("failed to read sheet '{name}'"), &e))?;
        load_values(&mut grid, &values);

        // Formulas override cached values; a sheet without them is fine
        if let Ok(formulas) = workbook.worksheet_formula(&name) {
            load_formulas(&mut grid, &formulas);
        }

        if let Some(Ok(merges)) = workbook.worksheet_merge_cells(&name) {
            for dim in merges {
                grid.add_merged(MergedRange::new(
                    to_cell_ref(dim.start, 0, 0),
                    to_cell_ref(dim.end, 0, 0),
                ));
            }
        }

        debug!(
            sheet = %name,
            cells = grid.cells().count(),
            merged = grid.merged().len(),
            "imported template sheet"
        );
        sheets.push(Sheet { name, grid });
    }

    Ok(TemplateWorkbook::new(sheets))
}

/// calamine iterators are relative to `range.start()`, zero-based
fn to_cell_ref(start: (u32, u32), row: usize, col: usize) -> CellRef {
    let row = start.0 + row as u32 + 1;
    let col = (start.1 as usize + col + 1).min(u16::MAX as usize) as u16;
    CellRef::new(row, col)
}

fn load_values(grid: &mut SheetGrid, range: &Range<Data>) {
    let Some(start) = range.start() else {
        return;
    };
    for (row, col, data) in range.used_cells() {
        grid.insert(to_cell_ref(start, row, col), convert_value(data));
    }
}

fn load_formulas(grid: &mut SheetGrid, range: &Range<String>) {
    let Some(start) = range.start() else {
        return;
    };
    for (row, col, formula) in range.used_cells() {
        let trimmed = formula.trim();
        if trimmed.is_empty() {
            continue;
        }
        let formula = if trimmed.starts_with('=') {
            trimmed.to_string()
        } else {
            format!("={trimmed}")
        };
        grid.insert(to_cell_ref(start, row, col), CellValue::Formula(formula));
    }
}

fn convert_value(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cell_ref_offsets_start() {
        assert_eq!(to_cell_ref((0, 0), 0, 0), CellRef::new(1, 1));
        assert_eq!(to_cell_ref((7, 2), 1, 3), CellRef::new(9, 6));
    }

    #[test]
    fn test_convert_value() {
        assert_eq!(convert_value(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(convert_value(&Data::String("단가".into())), CellValue::Text("단가".into()));
        assert_eq!(convert_value(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(convert_value(&Data::Empty), CellValue::Empty);
    }

    #[test]
    fn test_missing_template_is_distinct_error() {
        let importer = TemplateImporter::new("/nonexistent/template.xlsx");
        assert_eq!(
            importer.import(),
            Err(ExportError::TemplateNotFound(PathBuf::from("/nonexistent/template.xlsx")))
        );
    }
}
