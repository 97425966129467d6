use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::cmd::stress::StressReport;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_stress_report(report: &StressReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => println!("{}", report_table(report)),
        OutputFormat::Pretty => {
            let stats = &report.stats;
            println!(
                "strategy={} threads={} frames={} owners_verified={} corruptions={} elapsed_ms={}",
                report.strategy,
                report.threads,
                report.frames,
                report.owners_verified,
                report.corruptions,
                report.elapsed_ms
            );
            println!(
                "takes={} reuses={} fresh={} gives={} discarded={} idle={} ({} bytes) outstanding={}",
                stats.takes,
                stats.reuses,
                stats.fresh_allocations,
                stats.gives,
                stats.discarded,
                stats.idle_buffers,
                stats.idle_bytes,
                report.outstanding
            );
        }
        OutputFormat::Raw => println!("{}", report.corruptions),
    }
}

fn report_table(report: &StressReport) -> Table {
    let stats = &report.stats;
    let rows = [
        ("strategy", report.strategy.to_string()),
        ("threads", report.threads.to_string()),
        ("frames", report.frames.to_string()),
        ("owners verified", report.owners_verified.to_string()),
        ("corruptions", report.corruptions.to_string()),
        ("takes", stats.takes.to_string()),
        ("reuses", stats.reuses.to_string()),
        ("fresh allocations", stats.fresh_allocations.to_string()),
        ("gives", stats.gives.to_string()),
        ("discarded", stats.discarded.to_string()),
        ("idle buffers", stats.idle_buffers.to_string()),
        ("idle bytes", stats.idle_bytes.to_string()),
        ("outstanding", report.outstanding.to_string()),
        ("elapsed (ms)", report.elapsed_ms.to_string()),
    ];

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["METRIC", "VALUE"]);
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    table
}
