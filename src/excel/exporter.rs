//! Template exporter implementation - Estimate → filled cost sheet (.xlsx)
//!
//! The template is human-authored and its columns drift, so positions are
//! rediscovered from header text on every export and fall back to the
//! reference layout when a keyword is missing.

use super::grid::{CellRef, CellValue, SheetGrid};
use super::importer::TemplateImporter;
use super::layout::{ColumnSpec, HeaderField, TemplateLayout};
use super::placement::{assign_slots, Placement};
use super::workbook::TemplateWorkbook;
use crate::core::coerce::parse_number;
use crate::core::CostCalculator;
use crate::error::ExportError;
use crate::types::{Estimate, EstimateHeader, ProcessCost};
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of a successful export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    /// Serialized xlsx
    pub bytes: Vec<u8>,
    pub report: FillReport,
}

/// What happened while filling the sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillReport {
    pub sheet_name: String,
    /// Writes refused by merged regions ([`ExportError::CellWriteSkipped`])
    pub skipped: Vec<ExportError>,
    /// Material lines beyond the block's last row
    pub dropped_material_lines: usize,
    /// Process lines that found neither a labeled row nor a free row
    pub unplaced_process_lines: usize,
    /// Value written into the processing-cost total cell
    pub total_process_cost: f64,
    /// Where the total was written; `None` when no label was found or the
    /// target cell was refused by a merged region
    pub total_cell: Option<CellRef>,
}

/// Writes into one sheet and keeps merge refusals instead of failing
struct SheetWriter<'a> {
    grid: &'a mut SheetGrid,
    skipped: Vec<ExportError>,
}

impl<'a> SheetWriter<'a> {
    fn new(grid: &'a mut SheetGrid) -> Self {
        Self {
            grid,
            skipped: Vec::new(),
        }
    }

    fn put(&mut self, row: u32, col: u16, value: impl Into<CellValue>) {
        self.try_put(CellRef::new(row, col), value);
    }

    /// Like [`SheetWriter::put`], reporting whether the cell was written
    fn try_put(&mut self, cell: CellRef, value: impl Into<CellValue>) -> bool {
        match self.grid.write(cell, value.into()) {
            Ok(()) => true,
            Err(skip) => {
                self.skipped.push(skip);
                false
            }
        }
    }
}

/// Material columns resolved against one template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaterialTargets {
    code: u16,
    name: u16,
    us: u16,
    spec: u16,
    unit: u16,
    price: u16,
    net: u16,
    scrap: u16,
    input: u16,
    loss_rate: u16,
    waste: u16,
    die_loss: u16,
}

impl MaterialTargets {
    fn all(&self) -> [u16; 12] {
        [
            self.code,
            self.name,
            self.us,
            self.spec,
            self.unit,
            self.price,
            self.net,
            self.scrap,
            self.input,
            self.loss_rate,
            self.waste,
            self.die_loss,
        ]
    }
}

/// Fills a cost sheet template from an estimate
pub struct TemplateExporter {
    layout: TemplateLayout,
}

impl TemplateExporter {
    pub fn new(layout: TemplateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &TemplateLayout {
        &self.layout
    }

    /// Load `template_path`, fill it and patch the filled cells into a copy
    /// of the template, keeping its formatting
    pub fn export(&self, template_path: &Path, estimate: &Estimate) -> Result<ExportOutcome, ExportError> {
        let (mut workbook, mut package) = TemplateImporter::new(template_path).import()?;
        let report = self.fill(&mut workbook, estimate)?;

        let edits = workbook
            .sheet(&report.sheet_name)
            .map(|sheet| sheet.grid.edits())
            .unwrap_or_default();
        package.patch_sheet(&report.sheet_name, &edits)?;
        let bytes = package.to_bytes()?;

        info!(
            template = %template_path.display(),
            sheet = %report.sheet_name,
            skipped = report.skipped.len(),
            bytes = bytes.len(),
            "cost sheet exported"
        );
        Ok(ExportOutcome { bytes, report })
    }

    /// Fill the cost sheet of an already loaded workbook
    pub fn fill(&self, workbook: &mut TemplateWorkbook, estimate: &Estimate) -> Result<FillReport, ExportError> {
        let index = workbook
            .select_sheet(&self.layout)
            .ok_or_else(|| ExportError::Unexpected("template has no worksheets".to_string()))?;
        let sheet = &mut workbook.sheets[index];
        debug!(sheet = %sheet.name, "selected cost sheet");

        let calculator = CostCalculator::for_estimate(estimate);
        let (processes, total_process_cost) = calculator.compute_process(&estimate.process_lines);

        let mut report = FillReport {
            sheet_name: sheet.name.clone(),
            total_process_cost,
            ..Default::default()
        };

        // Columns are discovered on the untouched template
        let material_columns = self.material_columns(&sheet.grid);

        let mut writer = SheetWriter::new(&mut sheet.grid);
        self.write_header(&mut writer, &estimate.header);
        report.dropped_material_lines = self.write_materials(&mut writer, &material_columns, estimate);
        report.unplaced_process_lines = self.write_processes(&mut writer, &processes, estimate.header.labor_rate);
        self.write_row_overrides(&mut writer, &processes);
        report.total_cell = self.write_total(&mut writer, total_process_cost);

        report.skipped = writer.skipped;
        Ok(report)
    }

    /// Basic information: value goes `offset` columns right of each label
    fn write_header(&self, writer: &mut SheetWriter<'_>, header: &EstimateHeader) {
        let mut targets: Vec<(CellRef, HeaderField)> = Vec::new();

        for (cell, value) in writer.grid.cells_in_rows(1..=self.layout.label_scan_rows) {
            let Some(text) = value.text() else {
                continue;
            };
            for rule in &self.layout.header_labels {
                if rule.matches(&text) {
                    targets.push((CellRef::new(cell.row, cell.col + rule.offset), rule.field));
                }
            }
        }

        for (target, field) in targets {
            let value = match field {
                HeaderField::PartNumber => CellValue::from(&header.part_number),
                HeaderField::PartName => CellValue::from(&header.part_name),
                HeaderField::VehicleModel => CellValue::from(&header.vehicle_model),
                HeaderField::Company => CellValue::from(&header.company),
                HeaderField::LaborRate => CellValue::Number(header.labor_rate),
            };
            writer.put(target.row, target.col, value);
        }
    }

    fn material_columns(&self, grid: &SheetGrid) -> MaterialTargets {
        let spec = &self.layout.material_columns;
        let scan = self.layout.header_scan_rows;
        let find = |c: &ColumnSpec| grid.find_column(&c.keyword, c.default, scan);

        MaterialTargets {
            code: find(&spec.code),
            name: find(&spec.name),
            us: find(&spec.us),
            spec: find(&spec.spec),
            unit: find(&spec.unit),
            price: find(&spec.price),
            net: find(&spec.net),
            scrap: find(&spec.scrap),
            input: find(&spec.input),
            loss_rate: find(&spec.loss_rate),
            waste: find(&spec.waste),
            die_loss: find(&spec.die_loss),
        }
    }

    /// Clear the material block, then write non-blank lines top-down.
    /// Returns how many lines did not fit.
    fn write_materials(&self, writer: &mut SheetWriter<'_>, cols: &MaterialTargets, estimate: &Estimate) -> usize {
        let block = self.layout.material_block;
        for row in block.rows() {
            for col in cols.all() {
                writer.put(row, col, CellValue::Empty);
            }
        }

        let lines: Vec<_> = estimate.material_lines.iter().filter(|l| !l.is_blank()).collect();
        let capacity = block.capacity();

        for (offset, line) in lines.iter().take(capacity).enumerate() {
            let row = block.first + offset as u32;
            writer.put(row, cols.code, &line.part_code);
            writer.put(row, cols.name, &line.part_name);
            writer.put(row, cols.us, line.us_per_assembly);
            writer.put(row, cols.spec, &line.spec);
            writer.put(row, cols.unit, &line.unit);
            writer.put(row, cols.price, line.unit_price);
            writer.put(row, cols.net, line.net_weight);
            writer.put(row, cols.scrap, parse_number(&line.scrap_weight));
            // Input weight mirrors NET in the reference template
            writer.put(row, cols.input, line.net_weight);
            writer.put(row, cols.loss_rate, line.loss_rate_pct);
            writer.put(row, cols.waste, line.waste_cost);
            writer.put(row, cols.die_loss, line.die_cast_loss_allowance);
        }

        let dropped = lines.len().saturating_sub(capacity);
        if dropped > 0 {
            warn!(dropped, capacity, "material lines exceed template block, extra rows dropped");
        }
        dropped
    }

    /// Clear the process block and place each named line by label or first free row.
    /// Returns how many named lines could not be placed.
    fn write_processes(&self, writer: &mut SheetWriter<'_>, processes: &[ProcessCost], labor_rate: f64) -> usize {
        let cols = &self.layout.process_columns;
        let block = self.layout.process_block;

        // Labels are read before clearing so known process rows keep their identity
        let lookup_last = self.layout.process_lookup_last_row.max(block.last);
        let labels: Vec<(u32, String)> = (block.first..=lookup_last)
            .filter_map(|row| {
                writer
                    .grid
                    .text_at(row, cols.process)
                    .map(|t| (row, t.trim().to_string()))
                    .filter(|(_, t)| !t.is_empty())
            })
            .collect();

        for row in block.rows() {
            for col in [
                cols.part_name,
                cols.us,
                cols.process,
                cols.machine,
                cols.headcount,
                cols.cycle_time,
                cols.setup_time,
                cols.basis_rate,
            ] {
                writer.put(row, col, CellValue::Empty);
            }
            writer.put(row, cols.rate, labor_rate);
        }

        // Merged cells may have survived the clear; those rows stay taken
        let free_rows: Vec<u32> = block
            .rows()
            .filter(|row| writer.grid.text_at(*row, cols.process).is_none())
            .collect();

        let keys: Vec<&str> = processes.iter().map(|p| p.line.process_key()).collect();
        let slots = assign_slots(&labels, &free_rows, &keys);

        let mut unplaced = 0;
        for (process, slot) in processes.iter().zip(slots) {
            if process.line.process_key().is_empty() {
                continue;
            }
            match slot {
                Some(placement) => {
                    debug!(process = %process.line.process_key(), ?placement, "placing process line");
                    self.write_process_row(writer, placement.row(), process);
                }
                None => unplaced += 1,
            }
        }

        if unplaced > 0 {
            warn!(unplaced, "process lines did not fit the template block");
        }
        unplaced
    }

    fn write_process_row(&self, writer: &mut SheetWriter<'_>, row: u32, process: &ProcessCost) {
        let cols = &self.layout.process_columns;
        let line = &process.line;

        writer.put(row, cols.part_name, &line.part_name);
        writer.put(row, cols.us, line.us_per_assembly);
        writer.put(row, cols.process, line.process_key());
        writer.put(row, cols.machine, &line.machine);
        writer.put(row, cols.headcount, line.headcount);
        writer.put(row, cols.cycle_time, line.cycle_time_sec);
        writer.put(row, cols.setup_time, line.setup_time_min);
        writer.put(row, cols.basis_rate, line.basis_rate_per_hr);
        writer.put(row, cols.rate, process.effective_rate);
        writer.put(row, cols.amount, process.total_process_cost);
    }

    /// Force configured process types into their fixed rows as well
    fn write_row_overrides(&self, writer: &mut SheetWriter<'_>, processes: &[ProcessCost]) {
        for rule in &self.layout.row_overrides {
            let hit = processes
                .iter()
                .find(|p| p.line.process_name.contains(rule.keyword.as_str()));
            if let Some(process) = hit {
                debug!(keyword = %rule.keyword, row = rule.row, "applying fixed row override");
                self.write_process_row(writer, rule.row, process);
            }
        }
    }

    /// Overwrite the displayed processing-cost total with the computed one
    fn write_total(&self, writer: &mut SheetWriter<'_>, total: f64) -> Option<CellRef> {
        let marker = &self.layout.total_marker;
        let label = writer.grid.locate(1..=marker.scan_rows, |value| {
            value.text().is_some_and(|text| {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                marker.all_of.iter().all(|k| compact.contains(k.as_str()))
            })
        })?;

        let target = writer
            .grid
            .cells_in_rows(label.row..=label.row)
            .filter(|(cell, value)| cell.col > label.col && value.is_numeric_or_formula())
            .map(|(cell, _)| cell)
            .last()
            .unwrap_or_else(|| CellRef::new(label.row, label.col + marker.fallback_offset));

        // A merged target is written through its anchor while that stays right of the label
        let anchor = writer.grid.merge_anchor(target);
        let target = if anchor.col > label.col { anchor } else { target };

        if writer.try_put(target, total) {
            Some(target)
        } else {
            warn!(label = %label, cell = %target, "processing-cost total not written");
            None
        }
    }
}

impl Default for TemplateExporter {
    fn default() -> Self {
        Self::new(TemplateLayout::default())
    }
}

/// Download name: `원가계산서_{part number}_{part name}.xlsx`
pub fn download_file_name(header: &EstimateHeader) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
            .collect()
    };
    format!(
        "원가계산서_{}_{}.xlsx",
        clean(&header.part_number),
        clean(&header.part_name)
    )
}
