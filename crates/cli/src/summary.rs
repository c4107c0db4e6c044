// Per-version summary table printed after a run or a diff

use colored::Colorize;
use tabled::{Table, Tabled};

use compat_table_core::domain::FinalReport;

#[derive(Tabled)]
struct VersionRow {
    version: String,
    passed: u32,
    total: u32,
    percent: String,
}

pub fn render(report: &FinalReport) -> String {
    let rows: Vec<VersionRow> = report
        .versions
        .iter()
        .map(|(version, results)| VersionRow {
            version: version.clone(),
            passed: results.successful_count(),
            total: results.total_count(),
            percent: format!("{:.1}%", results.percent() * 100.0),
        })
        .collect();

    format!(
        "{} {} ({})\n{}",
        "Engine:".bold(),
        report.engine_name,
        report.reported_version,
        Table::new(rows)
    )
}
