use crate::types::{CostSummary, Estimate, MaterialCost, MaterialLine, ProcessCost, ProcessLine};

/// Cost calculator for material and processing tables
///
/// Every derived field is a pure function of its own line plus, for process
/// lines, the estimate's default labor rate.
pub struct CostCalculator {
    default_labor_rate: f64,
}

impl CostCalculator {
    #[must_use]
    pub fn new(default_labor_rate: f64) -> Self {
        Self { default_labor_rate }
    }

    /// Calculator configured with the estimate's applied labor rate
    #[must_use]
    pub fn for_estimate(estimate: &Estimate) -> Self {
        Self::new(estimate.header.labor_rate)
    }

    pub fn default_labor_rate(&self) -> f64 {
        self.default_labor_rate
    }

    /// Basis rate when set, otherwise the default labor rate
    pub fn effective_rate(&self, line: &ProcessLine) -> f64 {
        if line.basis_rate_per_hr > 0.0 {
            line.basis_rate_per_hr
        } else {
            self.default_labor_rate
        }
    }

    pub fn material(&self, line: &MaterialLine) -> MaterialCost {
        let amount = line.unit_price * line.net_weight * line.us_per_assembly;
        let loss_amount = amount * (line.loss_rate_pct / 100.0);
        let material_cost = amount + loss_amount + line.waste_cost + line.die_cast_loss_allowance;

        MaterialCost {
            line: line.clone(),
            amount,
            loss_amount,
            material_cost,
        }
    }

    pub fn process(&self, line: &ProcessLine) -> ProcessCost {
        let rate = self.effective_rate(line);
        let per_hour = rate * line.headcount * line.us_per_assembly;

        let process_cost = (line.cycle_time_sec / 3600.0) * per_hour;
        let setup_cost = (line.setup_time_min / 60.0) * per_hour;
        // Allowance uplifts cycle cost only, never setup
        let total_process_cost = process_cost * (1.0 + line.allowance_pct / 100.0) + setup_cost;

        ProcessCost {
            line: line.clone(),
            effective_rate: rate,
            process_cost,
            setup_cost,
            total_process_cost,
        }
    }

    /// Derive every material line and the table total
    pub fn compute_material(&self, lines: &[MaterialLine]) -> (Vec<MaterialCost>, f64) {
        let rows: Vec<MaterialCost> = lines.iter().map(|l| self.material(l)).collect();
        let total = rows.iter().map(|r| r.material_cost).sum();
        (rows, total)
    }

    /// Derive every process line and the table total
    pub fn compute_process(&self, lines: &[ProcessLine]) -> (Vec<ProcessCost>, f64) {
        let rows: Vec<ProcessCost> = lines.iter().map(|l| self.process(l)).collect();
        let total = rows.iter().map(|r| r.total_process_cost).sum();
        (rows, total)
    }

    /// Both tables plus totals for a whole estimate
    pub fn compute_estimate(&self, estimate: &Estimate) -> CostSummary {
        let (materials, total_material_cost) = self.compute_material(&estimate.material_lines);
        let (processes, total_process_cost) = self.compute_process(&estimate.process_lines);

        CostSummary {
            materials,
            processes,
            estimated_material_total: estimated_material_total(&estimate.material_lines),
            total_material_cost,
            total_process_cost,
            grand_total: total_material_cost + total_process_cost,
        }
    }
}

/// Material cost table for `lines`, see [`CostCalculator::compute_material`]
pub fn compute_material(lines: &[MaterialLine]) -> (Vec<MaterialCost>, f64) {
    // Material costs never depend on the labor rate
    CostCalculator::new(0.0).compute_material(lines)
}

/// Process cost table for `lines`, see [`CostCalculator::compute_process`]
pub fn compute_process(lines: &[ProcessLine], default_labor_rate: f64) -> (Vec<ProcessCost>, f64) {
    CostCalculator::new(default_labor_rate).compute_process(lines)
}

/// Full summary using the estimate's own labor rate
pub fn compute_estimate(estimate: &Estimate) -> CostSummary {
    CostCalculator::for_estimate(estimate).compute_estimate(estimate)
}

/// Preview figure: base material amounts only (no loss, waste or die-cast terms)
pub fn estimated_material_total(lines: &[MaterialLine]) -> f64 {
    lines
        .iter()
        .map(|l| l.unit_price * l.net_weight * l.us_per_assembly)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sample_material() -> MaterialLine {
        MaterialLine {
            part_name: "BRACKET".to_string(),
            unit_price: 10.0,
            net_weight: 5.0,
            us_per_assembly: 2.0,
            loss_rate_pct: 10.0,
            waste_cost: 3.0,
            die_cast_loss_allowance: 1.0,
            ..Default::default()
        }
    }

    fn hour_process() -> ProcessLine {
        ProcessLine {
            process_name: "ASSY".to_string(),
            cycle_time_sec: 3600.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_material_cost_formula() {
        let row = CostCalculator::new(3500.0).material(&sample_material());
        assert!(approx(row.amount, 100.0));
        assert!(approx(row.loss_amount, 10.0));
        assert!(approx(row.material_cost, 114.0));
    }

    #[test]
    fn test_effective_rate_falls_back_to_default() {
        let calc = CostCalculator::new(3500.0);
        assert_eq!(calc.effective_rate(&hour_process()), 3500.0);

        let negative = ProcessLine {
            basis_rate_per_hr: -5.0,
            ..hour_process()
        };
        assert_eq!(calc.effective_rate(&negative), 3500.0);
    }

    #[test]
    fn test_basis_rate_overrides_default() {
        let line = ProcessLine {
            basis_rate_per_hr: 4000.0,
            ..hour_process()
        };
        assert_eq!(CostCalculator::new(3500.0).effective_rate(&line), 4000.0);
        assert_eq!(CostCalculator::new(9999.0).effective_rate(&line), 4000.0);
    }

    #[test]
    fn test_one_hour_at_default_rate() {
        let row = CostCalculator::new(3500.0).process(&hour_process());
        assert!(approx(row.total_process_cost, 3500.0));
    }

    #[test]
    fn test_allowance_excludes_setup() {
        let line = ProcessLine {
            allowance_pct: 10.0,
            setup_time_min: 60.0,
            ..hour_process()
        };
        let row = CostCalculator::new(3500.0).process(&line);
        assert!(approx(row.process_cost, 3500.0));
        assert!(approx(row.process_cost * 1.1, 3850.0));
        assert!(approx(row.setup_cost, 3500.0));
        assert!(approx(row.total_process_cost, 7350.0));
    }

    #[test]
    fn test_headcount_and_us_scale_cost() {
        let line = ProcessLine {
            headcount: 2.0,
            us_per_assembly: 3.0,
            ..hour_process()
        };
        let row = CostCalculator::new(1000.0).process(&line);
        assert!(approx(row.total_process_cost, 6000.0));
    }

    #[test]
    fn test_empty_tables_total_zero() {
        let (rows, total) = compute_material(&[]);
        assert!(rows.is_empty());
        assert_eq!(total, 0.0);

        let (rows, total) = compute_process(&[], 3500.0);
        assert!(rows.is_empty());
        assert_eq!(total, 0.0);
        assert!(!total.is_nan());
    }

    #[test]
    fn test_totals_sum_lines_in_order() {
        let lines = vec![sample_material(), sample_material()];
        let (rows, total) = compute_material(&lines);
        assert_eq!(rows.len(), 2);
        assert!(approx(total, 228.0));

        let (rows, total) = compute_process(&[hour_process(), hour_process()], 3500.0);
        assert_eq!(rows[1].line.process_name, "ASSY");
        assert!(approx(total, 7000.0));
    }

    #[test]
    fn test_compute_estimate_uses_header_rate() {
        let mut estimate = Estimate::default();
        estimate.header.labor_rate = 5000.0;
        estimate.material_lines.push(sample_material());
        estimate.process_lines.push(hour_process());

        let summary = compute_estimate(&estimate);
        assert!(approx(summary.total_material_cost, 114.0));
        assert!(approx(summary.total_process_cost, 5000.0));
        assert!(approx(summary.grand_total, 5114.0));
    }

    #[test]
    fn test_estimated_material_total_is_base_amount() {
        assert!(approx(estimated_material_total(&[sample_material()]), 100.0));
    }
}
