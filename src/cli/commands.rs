use crate::core::CostCalculator;
use crate::error::{CostError, CostResult};
use crate::excel::{download_file_name, FillReport, TemplateExporter, TemplateLayout};
use crate::store::SnapshotStore;
use crate::types::{CostSummary, Estimate, EstimateSnapshot, MaterialLine, ProcessLine};
use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    // Round to 6 decimal places for display
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Whole KRW with thousands separators, for totals
fn format_won(n: f64) -> String {
    let rounded = n.round();
    let digits = format!("{}", rounded.abs() as i64);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Read an estimate YAML file
pub fn read_estimate(path: &Path) -> CostResult<Estimate> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Estimate::default());
    }
    Ok(serde_yaml::from_str(&content)?)
}

/// Write an estimate as YAML
pub fn write_estimate(path: &Path, estimate: &Estimate) -> CostResult<()> {
    let yaml = serde_yaml::to_string(estimate)?;
    fs::write(path, yaml)?;
    Ok(())
}

/// Execute the calc command
pub fn calc(file: PathBuf, verbose: bool) -> CostResult<()> {
    println!("{}", "🧮 costsheet - Cost calculation".bold().green());
    println!("   File: {}\n", file.display());

    let estimate = read_estimate(&file)?;
    print_header(&estimate);

    if verbose {
        println!(
            "   Found {} material lines, {} process lines\n",
            estimate.material_lines.len(),
            estimate.process_lines.len()
        );
    }

    let summary = CostCalculator::for_estimate(&estimate).compute_estimate(&estimate);
    print_summary(&summary, verbose);
    Ok(())
}

/// Execute the new command: write a blank estimate
pub fn new_estimate(file: PathBuf, labor_rate: f64, force: bool) -> CostResult<()> {
    if file.exists() && !force {
        return Err(CostError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", file.display()),
        )));
    }

    write_estimate(&file, &blank_estimate(labor_rate))?;

    println!("{}", "📝 New estimate created".bold().green());
    println!("   File: {}", file.display());
    println!("   Applied labor rate: {} KRW/hr\n", format_won(labor_rate));
    Ok(())
}

/// One empty row in each table so the field names are visible when editing
fn blank_estimate(labor_rate: f64) -> Estimate {
    let mut estimate = Estimate::default();
    estimate.header.labor_rate = labor_rate;
    estimate.material_lines.push(MaterialLine::default());
    estimate.process_lines.push(ProcessLine::default());
    estimate
}

/// Execute the save command
pub fn save(file: PathBuf, name: Option<String>, store_path: PathBuf) -> CostResult<()> {
    let estimate = read_estimate(&file)?;
    let store = SnapshotStore::new(&store_path);
    let (snapshot, written) = store.save_estimate(&estimate, name.as_deref());

    if !written {
        println!("{}", "❌ Save failed".bold().red());
        println!("   Store: {}", store_path.display());
        return Err(CostError::Io(io::Error::other(format!(
            "could not write snapshot store {}",
            store_path.display()
        ))));
    }

    println!("{}", "💾 Estimate saved".bold().green());
    println!("   ID:    {}", snapshot.id.bright_blue().bold());
    println!("   Name:  {}", snapshot.name);
    println!("   Store: {}\n", store_path.display());
    Ok(())
}

/// Execute the list command
pub fn list(store_path: PathBuf) -> CostResult<()> {
    let store = SnapshotStore::new(&store_path);
    let listing = store.list_newest_first();

    println!("{}", "📂 Saved estimates".bold().green());
    println!("   Store: {}\n", store_path.display());

    if listing.is_empty() {
        println!("{}", "   No saved estimates".yellow());
        return Ok(());
    }

    println!(
        "   {:>4}  {:<16}  {:<19}  {:<14}  {:<20}  {:<8}  {}",
        "No".bold(),
        "ID".bold(),
        "Saved".bold(),
        "Part number".bold(),
        "Part name".bold(),
        "Vehicle".bold(),
        "Company".bold()
    );
    println!("   {}", "─".repeat(100));
    for row in &listing {
        println!(
            "   {:>4}  {:<16}  {:<19}  {:<14}  {:<20}  {:<8}  {}",
            row.number,
            row.id.bright_blue(),
            row.saved_at,
            row.part_number,
            row.part_name,
            row.vehicle_model,
            row.company
        );
    }
    println!();
    Ok(())
}

fn find_snapshot(store: &SnapshotStore, id: &str) -> CostResult<EstimateSnapshot> {
    store
        .find(id)
        .ok_or_else(|| CostError::SnapshotNotFound(id.to_string()))
}

/// Execute the show command
pub fn show(id: String, store_path: PathBuf) -> CostResult<()> {
    let store = SnapshotStore::new(&store_path);
    let snapshot = find_snapshot(&store, &id)?;

    println!("{}", "📄 Saved estimate".bold().green());
    println!("   ID:    {}", snapshot.id.bright_blue().bold());
    println!("   Name:  {}", snapshot.name);
    println!("   Saved: {}\n", snapshot.saved_at);

    let estimate = Estimate::from(&snapshot);
    print_header(&estimate);
    let summary = CostCalculator::for_estimate(&estimate).compute_estimate(&estimate);
    print_summary(&summary, true);
    Ok(())
}

/// Execute the load command: snapshot → editable estimate file
pub fn load(id: String, output: PathBuf, store_path: PathBuf) -> CostResult<()> {
    let store = SnapshotStore::new(&store_path);
    let snapshot = find_snapshot(&store, &id)?;
    write_estimate(&output, &Estimate::from(&snapshot))?;

    println!("{}", "📥 Estimate loaded".bold().green());
    println!("   ID:     {}", snapshot.id.bright_blue().bold());
    println!("   Output: {}\n", output.display());
    Ok(())
}

/// Execute the export command
pub fn export(
    file: PathBuf,
    template: PathBuf,
    output: Option<PathBuf>,
    layout: TemplateLayout,
    verbose: bool,
) -> CostResult<()> {
    println!("{}", "📊 costsheet - Template export".bold().green());
    println!("   Input:    {}", file.display());
    println!("   Template: {}", template.display());

    let estimate = read_estimate(&file)?;
    let output = output.unwrap_or_else(|| PathBuf::from(download_file_name(&estimate.header)));
    println!("   Output:   {}\n", output.display());

    let outcome = TemplateExporter::new(layout).export(&template, &estimate)?;
    fs::write(&output, &outcome.bytes)?;

    println!("{}", "✅ Export complete".bold().green());
    print_report(&outcome.report, verbose);
    Ok(())
}

fn print_report(report: &FillReport, verbose: bool) {
    println!("   Sheet: {}", report.sheet_name.bright_blue());
    println!(
        "   Processing cost total: {} KRW",
        format_won(report.total_process_cost).bold()
    );
    match report.total_cell {
        Some(cell) => println!("   Total written to: {cell}"),
        None => println!(
            "{}",
            "   ⚠️  Processing cost total not written (label not found or cell merged)".yellow()
        ),
    }
    if report.dropped_material_lines > 0 {
        println!(
            "{}",
            format!(
                "   ⚠️  {} material lines did not fit the template",
                report.dropped_material_lines
            )
            .yellow()
        );
    }
    if report.unplaced_process_lines > 0 {
        println!(
            "{}",
            format!(
                "   ⚠️  {} process lines did not fit the template",
                report.unplaced_process_lines
            )
            .yellow()
        );
    }
    if !report.skipped.is_empty() {
        println!(
            "{}",
            format!("   ⚠️  {} cells skipped (merged regions)", report.skipped.len()).yellow()
        );
        if verbose {
            for skip in &report.skipped {
                println!("      {skip}");
            }
        }
    }
    println!();
}

fn print_header(estimate: &Estimate) {
    let header = &estimate.header;
    println!("{}", "📋 Basic information".bold().cyan());
    println!("   Part number:  {}", header.part_number);
    println!("   Part name:    {}", header.part_name);
    println!("   Vehicle:      {}", header.vehicle_model);
    println!("   Company:      {}", header.company);
    println!("   Labor rate:   {} KRW/hr\n", format_won(header.labor_rate));
}

fn print_summary(summary: &CostSummary, verbose: bool) {
    println!("{}", "📦 Material cost".bold().cyan());
    for (idx, m) in summary.materials.iter().enumerate() {
        println!(
            "   {:>2}. {:<20} {:>12}",
            idx + 1,
            m.line.part_name.bright_blue(),
            format_number(m.material_cost)
        );
        if verbose {
            println!(
                "       price {} × NET {} × U/S {} = {}, LOSS {}% = {}, waste {}, die-cast {}",
                format_number(m.line.unit_price),
                format_number(m.line.net_weight),
                format_number(m.line.us_per_assembly),
                format_number(m.amount),
                format_number(m.line.loss_rate_pct),
                format_number(m.loss_amount),
                format_number(m.line.waste_cost),
                format_number(m.line.die_cast_loss_allowance)
            );
        }
    }
    println!();

    println!("{}", "⚙️  Processing cost".bold().cyan());
    for (idx, p) in summary.processes.iter().enumerate() {
        println!(
            "   {:>2}. {:<20} {:>12}",
            idx + 1,
            p.line.process_name.bright_blue(),
            format_number(p.total_process_cost)
        );
        if verbose {
            println!(
                "       CT {}s × {} persons @ {} KRW/hr = {}, allowance {}%, setup {}",
                format_number(p.line.cycle_time_sec),
                format_number(p.line.headcount),
                format_number(p.effective_rate),
                format_number(p.process_cost),
                format_number(p.line.allowance_pct),
                format_number(p.setup_cost)
            );
        }
    }
    println!();

    println!("{}", "💰 Totals".bold().green());
    println!(
        "   Material (est.):  {} KRW",
        format_won(summary.estimated_material_total)
    );
    println!(
        "   Material cost:    {} KRW",
        format_won(summary.total_material_cost).bold()
    );
    println!(
        "   Processing cost:  {} KRW",
        format_won(summary.total_process_cost).bold()
    );
    println!(
        "   Total:            {} KRW\n",
        format_won(summary.grand_total).bold().green()
    );
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
