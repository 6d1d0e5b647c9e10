//! Excel template module
//!
//! Fills a human-authored cost sheet template:
//! - Import: template (.xlsx) → in-memory grid with merged ranges
//! - Fill: keyword-based cell discovery, block clearing, slot placement
//! - Export: filled cells patched into the template's own worksheet XML

mod exporter;
mod grid;
mod importer;
mod layout;
mod package;
mod patch;
mod placement;
mod workbook;

pub use exporter::{download_file_name, ExportOutcome, FillReport, TemplateExporter};
pub use grid::{CellRef, CellValue, MergedRange, SheetGrid};
pub use importer::TemplateImporter;
pub use layout::{
    ColumnSpec, HeaderField, LabelRule, MaterialColumns, ProcessColumns, RowBlock, RowOverride,
    TemplateLayout, TotalMarker,
};
pub use package::TemplatePackage;
pub use placement::{assign_slots, Placement};
pub use workbook::{Sheet, TemplateWorkbook};
