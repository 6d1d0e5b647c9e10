//! Library-independent worksheet model
//!
//! Rows and columns are 1-based, matching what an operator sees in Excel
//! (row 9 is row 9, column C is 3).

use crate::core::coerce::format_plain;
use crate::error::ExportError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;

/// A 1-based cell coordinate. Ordering is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Column letters for a 1-based column number
    ///
    /// Examples:
    /// - 1 → A
    /// - 26 → Z
    /// - 27 → AA
    pub fn column_letter(col: u16) -> String {
        let mut result = String::new();
        let mut idx = col.saturating_sub(1) as usize;

        loop {
            let remainder = idx % 26;
            result.insert(0, (b'A' + remainder as u8) as char);
            if idx < 26 {
                break;
            }
            idx = idx / 26 - 1;
        }

        result
    }

    /// Parse an A1-style reference (`"H47"`, `"AB12"`); `$` markers are ignored
    pub fn from_a1(text: &str) -> Option<Self> {
        let text = text.trim().replace('$', "");
        let split = text.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > u16::MAX as u32 {
                return None;
            }
        }
        let row: u32 = digits.parse().ok().filter(|r| *r > 0)?;
        Some(Self::new(row, col as u16))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::column_letter(self.col), self.row)
    }
}

/// Cell content as far as the exporter cares
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Formula source including the leading `=`
    Formula(String),
}

impl CellValue {
    /// Text used for keyword matching; `None` for empty cells
    pub fn text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) | CellValue::Formula(s) => Some(s.clone()),
            CellValue::Number(n) => Some(format_plain(*n)),
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none()
    }

    /// Numbers and formulas are what a total cell looks like
    pub fn is_numeric_or_formula(&self) -> bool {
        matches!(self, CellValue::Number(_) | CellValue::Formula(_))
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<&String> for CellValue {
    fn from(value: &String) -> Self {
        CellValue::from(value.as_str())
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(CellValue::Empty, CellValue::Number)
    }
}

/// A merged block; only its top-left anchor accepts writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRange {
    pub first: CellRef,
    pub last: CellRef,
}

impl MergedRange {
    pub fn new(first: CellRef, last: CellRef) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.first.row..=self.last.row).contains(&cell.row)
            && (self.first.col..=self.last.col).contains(&cell.col)
    }

    pub fn is_single_cell(&self) -> bool {
        self.first == self.last
    }
}

/// Sparse cell grid of one worksheet
///
/// Cells changed through [`SheetGrid::write`] are remembered so the export
/// can patch exactly those cells into the original template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    cells: BTreeMap<CellRef, CellValue>,
    merged: Vec<MergedRange>,
    edited: BTreeSet<CellRef>,
}

static EMPTY: CellValue = CellValue::Empty;

impl SheetGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cell while building the grid (no merge checks)
    pub fn insert(&mut self, cell: CellRef, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value);
        }
    }

    pub fn add_merged(&mut self, range: MergedRange) {
        self.merged.push(range);
    }

    pub fn merged(&self) -> &[MergedRange] {
        &self.merged
    }

    pub fn get(&self, cell: CellRef) -> &CellValue {
        self.cells.get(&cell).unwrap_or(&EMPTY)
    }

    pub fn text_at(&self, row: u32, col: u16) -> Option<String> {
        self.get(CellRef::new(row, col)).text()
    }

    /// Non-empty cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &CellValue)> {
        self.cells.iter().map(|(cell, value)| (*cell, value))
    }

    /// Non-empty cells of the given rows, row-major
    pub fn cells_in_rows(&self, rows: RangeInclusive<u32>) -> impl Iterator<Item = (CellRef, &CellValue)> {
        let first = *rows.start();
        // Inverted ranges yield nothing
        let end = rows.end().saturating_add(1).max(first);
        self.cells
            .range(CellRef::new(first, 0)..CellRef::new(end, 0))
            .map(|(cell, value)| (*cell, value))
    }

    /// Write through merge protection: a non-anchor merged cell refuses the write
    pub fn write(&mut self, cell: CellRef, value: CellValue) -> Result<(), ExportError> {
        if self
            .merged
            .iter()
            .any(|m| m.contains(cell) && m.first != cell)
        {
            return Err(ExportError::CellWriteSkipped(cell));
        }
        self.insert(cell, value);
        self.edited.insert(cell);
        Ok(())
    }

    /// Anchor of the merged region covering `cell`, or `cell` itself
    pub fn merge_anchor(&self, cell: CellRef) -> CellRef {
        self.merged
            .iter()
            .find(|m| m.contains(cell))
            .map_or(cell, |m| m.first)
    }

    /// Cells changed by [`SheetGrid::write`] with their final values, row-major
    pub fn edits(&self) -> BTreeMap<CellRef, CellValue> {
        self.edited
            .iter()
            .map(|cell| (*cell, self.get(*cell).clone()))
            .collect()
    }

    /// First cell in scan order (top-to-bottom, left-to-right) within `rows`
    /// whose value satisfies `predicate`
    pub fn locate<F>(&self, rows: RangeInclusive<u32>, mut predicate: F) -> Option<CellRef>
    where
        F: FnMut(&CellValue) -> bool,
    {
        self.cells_in_rows(rows)
            .find(|(_, value)| predicate(value))
            .map(|(cell, _)| cell)
    }

    /// Column of the first header cell containing `keyword` in the first
    /// `header_rows` rows, or `default_column` when nothing matches
    pub fn find_column(&self, keyword: &str, default_column: u16, header_rows: u32) -> u16 {
        self.locate(1..=header_rows, |value| {
            value.text().is_some_and(|text| text.contains(keyword))
        })
        .map_or(default_column, |cell| cell.col)
    }
}
