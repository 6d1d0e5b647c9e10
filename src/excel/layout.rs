//! Where things live in the cost sheet template
//!
//! Defaults describe the reference template (Korean labels, material block
//! rows 9-24, process block rows 27-45). Every value can be overridden from
//! YAML so a reshuffled template does not need a rebuild.

use crate::error::CostResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// A header keyword plus the column to assume when the keyword is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub keyword: String,
    pub default: u16,
}

impl ColumnSpec {
    pub fn new(keyword: &str, default: u16) -> Self {
        Self {
            keyword: keyword.to_string(),
            default,
        }
    }
}

/// Inclusive row range forming a fixed-capacity block of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBlock {
    pub first: u32,
    pub last: u32,
}

impl RowBlock {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn rows(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn capacity(&self) -> usize {
        if self.last < self.first {
            0
        } else {
            (self.last - self.first + 1) as usize
        }
    }
}

/// Material table columns, discovered by header keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialColumns {
    pub code: ColumnSpec,
    pub name: ColumnSpec,
    pub us: ColumnSpec,
    pub spec: ColumnSpec,
    pub unit: ColumnSpec,
    pub price: ColumnSpec,
    pub net: ColumnSpec,
    pub scrap: ColumnSpec,
    /// Input weight, written as NET
    pub input: ColumnSpec,
    pub loss_rate: ColumnSpec,
    pub waste: ColumnSpec,
    pub die_loss: ColumnSpec,
}

impl Default for MaterialColumns {
    fn default() -> Self {
        Self {
            code: ColumnSpec::new("품번", 3),
            name: ColumnSpec::new("부품명", 6),
            us: ColumnSpec::new("U/S", 4),
            spec: ColumnSpec::new("재질", 5),
            unit: ColumnSpec::new("단위", 7),
            price: ColumnSpec::new("단가", 8),
            net: ColumnSpec::new("NET", 9),
            scrap: ColumnSpec::new("SCRAP", 10),
            input: ColumnSpec::new("투입", 11),
            loss_rate: ColumnSpec::new("LOSS율", 13),
            waste: ColumnSpec::new("산업폐기물", 15),
            die_loss: ColumnSpec::new("다이캐스팅", 16),
        }
    }
}

/// Process table columns (fixed positions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessColumns {
    pub part_name: u16,
    pub us: u16,
    pub process: u16,
    pub machine: u16,
    pub headcount: u16,
    pub cycle_time: u16,
    /// Effective rate (KRW/hr)
    pub rate: u16,
    /// Per-line total cost (KRW/EA)
    pub amount: u16,
    pub basis_rate: u16,
    pub setup_time: u16,
}

impl Default for ProcessColumns {
    fn default() -> Self {
        Self {
            part_name: 3,
            us: 5,
            process: 6,
            machine: 7,
            headcount: 9,
            cycle_time: 10,
            rate: 11,
            amount: 12,
            basis_rate: 13,
            setup_time: 15,
        }
    }
}

/// Header values the exporter can place next to a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderField {
    PartNumber,
    PartName,
    VehicleModel,
    Company,
    LaborRate,
}

/// Substring rule identifying a header label cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRule {
    pub field: HeaderField,
    /// At least one must appear (ignored when empty)
    #[serde(default)]
    pub any_of: Vec<String>,
    /// All must appear
    #[serde(default)]
    pub all_of: Vec<String>,
    /// None may appear
    #[serde(default)]
    pub none_of: Vec<String>,
    /// Columns to the right of the label where the value goes
    pub offset: u16,
}

impl LabelRule {
    fn new(field: HeaderField, any_of: &[&str], offset: u16) -> Self {
        Self {
            field,
            any_of: any_of.iter().map(|s| s.to_string()).collect(),
            all_of: Vec::new(),
            none_of: Vec::new(),
            offset,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        (self.any_of.is_empty() || self.any_of.iter().any(|k| text.contains(k.as_str())))
            && self.all_of.iter().all(|k| text.contains(k.as_str()))
            && !self.none_of.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Process type that is additionally forced into a fixed row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOverride {
    pub keyword: String,
    pub row: u32,
}

/// How to find the displayed processing-cost total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalMarker {
    /// All must appear in the label text (whitespace ignored)
    pub all_of: Vec<String>,
    pub scan_rows: u32,
    /// Columns right of the label used when the row has no number/formula cell
    pub fallback_offset: u16,
}

impl Default for TotalMarker {
    fn default() -> Self {
        Self {
            all_of: vec!["가공비".to_string(), "(4)".to_string()],
            scan_rows: 200,
            fallback_offset: 5,
        }
    }
}

/// Complete template description used by the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLayout {
    /// First sheet whose name contains one of these is used
    pub sheet_keywords: Vec<String>,
    /// Rows scanned for column headers
    pub header_scan_rows: u32,
    /// Rows scanned for basic-information labels
    pub label_scan_rows: u32,
    pub header_labels: Vec<LabelRule>,
    pub material_block: RowBlock,
    pub material_columns: MaterialColumns,
    pub process_block: RowBlock,
    /// Last row scanned for existing process-name labels
    pub process_lookup_last_row: u32,
    pub process_columns: ProcessColumns,
    pub row_overrides: Vec<RowOverride>,
    pub total_marker: TotalMarker,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            sheet_keywords: ["원가", "견적", "계산", "cost", "quote", "estimate"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            header_scan_rows: 40,
            label_scan_rows: 10,
            header_labels: vec![
                LabelRule::new(HeaderField::PartNumber, &["품 번", "품번"], 2),
                LabelRule {
                    none_of: vec!["부품명".to_string()],
                    ..LabelRule::new(HeaderField::PartName, &["품명"], 2)
                },
                LabelRule::new(HeaderField::VehicleModel, &["차종"], 1),
                LabelRule::new(HeaderField::Company, &["업체"], 1),
                LabelRule {
                    all_of: vec!["적용".to_string(), "임율".to_string()],
                    ..LabelRule::new(HeaderField::LaborRate, &[], 1)
                },
            ],
            material_block: RowBlock::new(9, 24),
            material_columns: MaterialColumns::default(),
            process_block: RowBlock::new(27, 45),
            process_lookup_last_row: 64,
            process_columns: ProcessColumns::default(),
            row_overrides: vec![
                RowOverride {
                    keyword: "하역/리패킹/검사".to_string(),
                    row: 44,
                },
                RowOverride {
                    keyword: "라벨/포장/출하".to_string(),
                    row: 45,
                },
            ],
            total_marker: TotalMarker::default(),
        }
    }
}

impl TemplateLayout {
    /// Load a layout from YAML; missing keys keep their defaults
    pub fn from_yaml_file(path: &Path) -> CostResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Does `sheet_name` look like the cost sheet?
    pub fn is_cost_sheet(&self, sheet_name: &str) -> bool {
        let name = sheet_name.to_lowercase();
        self.sheet_keywords
            .iter()
            .any(|k| name.contains(&k.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_block_capacities() {
        let layout = TemplateLayout::default();
        assert_eq!(layout.material_block.capacity(), 16);
        assert_eq!(layout.process_block.capacity(), 19);
    }

    #[test]
    fn test_part_name_rule_excludes_component_name() {
        let layout = TemplateLayout::default();
        let rule = layout
            .header_labels
            .iter()
            .find(|r| r.field == HeaderField::PartName)
            .unwrap();
        assert!(rule.matches("품명"));
        assert!(!rule.matches("부품명"));
    }

    #[test]
    fn test_labor_rate_rule_needs_both_words() {
        let layout = TemplateLayout::default();
        let rule = layout
            .header_labels
            .iter()
            .find(|r| r.field == HeaderField::LaborRate)
            .unwrap();
        assert!(rule.matches("적용임율"));
        assert!(rule.matches("적용 임율(원/HR)"));
        assert!(!rule.matches("임율(원/HR)"));
    }

    #[test]
    fn test_sheet_keyword_match_is_case_insensitive() {
        let layout = TemplateLayout::default();
        assert!(layout.is_cost_sheet("원가계산서"));
        assert!(layout.is_cost_sheet("Cost Sheet"));
        assert!(!layout.is_cost_sheet("Sheet1"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
material_block:
  first: 10
  last: 20
row_overrides:
  - keyword: PACK
    row: 50
"#;
        let layout: TemplateLayout = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(layout.material_block, RowBlock::new(10, 20));
        assert_eq!(layout.row_overrides.len(), 1);
        assert_eq!(layout.process_block, RowBlock::new(27, 45));
        assert_eq!(layout.material_columns.price.default, 8);
    }
}
