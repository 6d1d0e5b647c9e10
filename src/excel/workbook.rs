//! In-memory view of a template's sheets

use super::grid::SheetGrid;
use super::layout::TemplateLayout;

/// One worksheet of a template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub grid: SheetGrid,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid: SheetGrid::new(),
        }
    }
}

/// Sheets in workbook order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateWorkbook {
    pub sheets: Vec<Sheet>,
    /// Zero-based tab the workbook opens on
    pub active: usize,
}

impl TemplateWorkbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets, active: 0 }
    }

    pub fn with_active(mut self, active: usize) -> Self {
        self.active = active;
        self
    }

    /// Index of the cost sheet: first keyword match, else the active tab
    pub fn select_sheet(&self, layout: &TemplateLayout) -> Option<usize> {
        let last = self.sheets.len().checked_sub(1)?;
        Some(
            self.sheets
                .iter()
                .position(|s| layout.is_cost_sheet(&s.name))
                .unwrap_or(self.active.min(last)),
        )
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}
