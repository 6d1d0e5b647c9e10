use crate::core::coerce::{one, one_default, text_or_number, zero_default};
use serde::{Deserialize, Serialize};

/// Applied labor rate (KRW/hr) when an estimate does not specify one
pub const DEFAULT_LABOR_RATE: f64 = 3500.0;

fn default_labor_rate() -> f64 {
    DEFAULT_LABOR_RATE
}

//==============================================================================
// Input line items
//==============================================================================

/// One row of the material cost table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialLine {
    #[serde(default, deserialize_with = "text_or_number")]
    pub part_name: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub part_code: String,
    /// U/S, units per assembly
    #[serde(default = "one", deserialize_with = "one_default")]
    pub us_per_assembly: f64,
    /// Material / specification text
    #[serde(default, deserialize_with = "text_or_number")]
    pub spec: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub unit: String,
    #[serde(default, deserialize_with = "zero_default")]
    pub unit_price: f64,
    /// NET weight (g or mm)
    #[serde(default, deserialize_with = "zero_default")]
    pub net_weight: f64,
    /// SCRAP weight, free text in the editor
    #[serde(default, deserialize_with = "text_or_number")]
    pub scrap_weight: String,
    #[serde(default, deserialize_with = "zero_default")]
    pub loss_rate_pct: f64,
    /// Industrial waste disposal cost
    #[serde(default, deserialize_with = "zero_default")]
    pub waste_cost: f64,
    #[serde(default, deserialize_with = "zero_default")]
    pub die_cast_loss_allowance: f64,
}

impl Default for MaterialLine {
    fn default() -> Self {
        Self {
            part_name: String::new(),
            part_code: String::new(),
            us_per_assembly: 1.0,
            spec: String::new(),
            unit: String::new(),
            unit_price: 0.0,
            net_weight: 0.0,
            scrap_weight: String::new(),
            loss_rate_pct: 0.0,
            waste_cost: 0.0,
            die_cast_loss_allowance: 0.0,
        }
    }
}

impl MaterialLine {
    /// Rows without a part name are editor leftovers and never exported
    pub fn is_blank(&self) -> bool {
        self.part_name.trim().is_empty()
    }
}

/// One row of the processing (labor/machine) cost table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLine {
    #[serde(default, deserialize_with = "text_or_number")]
    pub part_name: String,
    #[serde(default = "one", deserialize_with = "one_default")]
    pub us_per_assembly: f64,
    /// Process name; also the key used to find the matching template row
    #[serde(default, deserialize_with = "text_or_number")]
    pub process_name: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub machine: String,
    #[serde(default = "one", deserialize_with = "one_default")]
    pub headcount: f64,
    #[serde(default, deserialize_with = "zero_default")]
    pub cycle_time_sec: f64,
    #[serde(default, deserialize_with = "zero_default")]
    pub setup_time_min: f64,
    /// Explicit hourly rate; 0 means "use the estimate's labor rate"
    #[serde(default, deserialize_with = "zero_default")]
    pub basis_rate_per_hr: f64,
    #[serde(default, deserialize_with = "zero_default")]
    pub allowance_pct: f64,
}

impl Default for ProcessLine {
    fn default() -> Self {
        Self {
            part_name: String::new(),
            us_per_assembly: 1.0,
            process_name: String::new(),
            machine: String::new(),
            headcount: 1.0,
            cycle_time_sec: 0.0,
            setup_time_min: 0.0,
            basis_rate_per_hr: 0.0,
            allowance_pct: 0.0,
        }
    }
}

impl ProcessLine {
    /// Trimmed process name used for template row matching
    pub fn process_key(&self) -> &str {
        self.process_name.trim()
    }
}

//==============================================================================
// Estimate (the working state passed through calculator, store and exporter)
//==============================================================================

/// Basic information block at the top of the cost sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateHeader {
    #[serde(default, deserialize_with = "text_or_number")]
    pub part_number: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub part_name: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub vehicle_model: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub company: String,
    /// Applied labor rate (KRW/hr)
    #[serde(default = "default_labor_rate", deserialize_with = "zero_default")]
    pub labor_rate: f64,
}

impl Default for EstimateHeader {
    fn default() -> Self {
        Self {
            part_number: String::new(),
            part_name: String::new(),
            vehicle_model: String::new(),
            company: String::new(),
            labor_rate: DEFAULT_LABOR_RATE,
        }
    }
}

/// A complete worksheet: header plus both line tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    #[serde(default)]
    pub header: EstimateHeader,
    #[serde(default)]
    pub material_lines: Vec<MaterialLine>,
    #[serde(default)]
    pub process_lines: Vec<ProcessLine>,
}

impl Estimate {
    /// Default snapshot name: `"{part number} - {part name}"`
    pub fn default_name(&self) -> String {
        format!("{} - {}", self.header.part_number, self.header.part_name)
    }
}

/// A saved, immutable copy of an estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateSnapshot {
    pub id: String,
    #[serde(default)]
    pub saved_at: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub part_name: String,
    #[serde(default)]
    pub vehicle_model: String,
    #[serde(default)]
    pub company: String,
    #[serde(default = "default_labor_rate")]
    pub labor_rate: f64,
    #[serde(default)]
    pub material_lines: Vec<MaterialLine>,
    #[serde(default)]
    pub process_lines: Vec<ProcessLine>,
}

impl EstimateSnapshot {
    /// Capture an estimate under the given id, timestamp and name
    pub fn capture(
        estimate: &Estimate,
        id: impl Into<String>,
        saved_at: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let header = &estimate.header;
        Self {
            id: id.into(),
            saved_at: saved_at.into(),
            name: name.into(),
            part_number: header.part_number.clone(),
            part_name: header.part_name.clone(),
            vehicle_model: header.vehicle_model.clone(),
            company: header.company.clone(),
            labor_rate: header.labor_rate,
            material_lines: estimate.material_lines.clone(),
            process_lines: estimate.process_lines.clone(),
        }
    }
}

impl From<&EstimateSnapshot> for Estimate {
    fn from(snapshot: &EstimateSnapshot) -> Self {
        Estimate {
            header: EstimateHeader {
                part_number: snapshot.part_number.clone(),
                part_name: snapshot.part_name.clone(),
                vehicle_model: snapshot.vehicle_model.clone(),
                company: snapshot.company.clone(),
                labor_rate: snapshot.labor_rate,
            },
            material_lines: snapshot.material_lines.clone(),
            process_lines: snapshot.process_lines.clone(),
        }
    }
}

//==============================================================================
// Derived (computed) rows
//==============================================================================

/// Material line with its derived amounts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCost {
    #[serde(flatten)]
    pub line: MaterialLine,
    /// unit price × NET × U/S
    pub amount: f64,
    pub loss_amount: f64,
    pub material_cost: f64,
}

/// Process line with its derived amounts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCost {
    #[serde(flatten)]
    pub line: ProcessLine,
    pub effective_rate: f64,
    pub process_cost: f64,
    pub setup_cost: f64,
    pub total_process_cost: f64,
}

/// Both computed tables and their totals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub materials: Vec<MaterialCost>,
    pub processes: Vec<ProcessCost>,
    /// Preview of base amounts only (price × NET × U/S)
    pub estimated_material_total: f64,
    pub total_material_cost: f64,
    pub total_process_cost: f64,
    pub grand_total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_yaml_with_loose_cells() {
        let yaml = r#"
header:
  partNumber: 96240-BQ000
  partName: ANTENA ASSY-CRASH PAD
  vehicleModel: QU2i
materialLines:
  - partName: BRACKET
    partCode: 12345
    unitPrice: "10"
    netWeight: 5
    usPerAssembly: ""
    scrapWeight: 0.3
processLines:
  - processName: ASSY
    headcount: abc
    cycleTimeSec: 30
"#;
        let estimate: Estimate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(estimate.header.labor_rate, DEFAULT_LABOR_RATE);
        assert_eq!(estimate.header.company, "");

        let mat = &estimate.material_lines[0];
        assert_eq!(mat.part_code, "12345");
        assert_eq!(mat.unit_price, 10.0);
        assert_eq!(mat.us_per_assembly, 1.0);
        assert_eq!(mat.scrap_weight, "0.3");

        let pro = &estimate.process_lines[0];
        assert_eq!(pro.headcount, 1.0);
        assert_eq!(pro.us_per_assembly, 1.0);
        assert_eq!(pro.basis_rate_per_hr, 0.0);
    }

    #[test]
    fn test_snapshot_roundtrip_through_estimate() {
        let estimate = Estimate {
            header: EstimateHeader {
                part_number: "P-1".to_string(),
                part_name: "Bracket".to_string(),
                vehicle_model: "QU2i".to_string(),
                company: "ACME".to_string(),
                labor_rate: 4200.0,
            },
            material_lines: vec![MaterialLine {
                part_name: "Plate".to_string(),
                ..Default::default()
            }],
            process_lines: vec![ProcessLine {
                process_name: "Press".to_string(),
                ..Default::default()
            }],
        };

        let snapshot = EstimateSnapshot::capture(&estimate, "1", "now", estimate.default_name());
        assert_eq!(snapshot.name, "P-1 - Bracket");
        assert_eq!(Estimate::from(&snapshot), estimate);
    }

    #[test]
    fn test_blank_material_line() {
        let line = MaterialLine {
            part_name: "   ".to_string(),
            ..Default::default()
        };
        assert!(line.is_blank());
    }
}
