//! Cost calculation: derived amounts and totals for material and process tables

pub mod calculator;
pub mod coerce;

pub use calculator::{
    compute_estimate, compute_material, compute_process, estimated_material_total,
    CostCalculator,
};
