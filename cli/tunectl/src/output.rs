//! Output formatting for CLI commands.

use colored::Colorize;
use nodetune_harness::{RollbackReport, RunReport};
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable text and tables.
    #[default]
    Text,
    /// JSON format.
    Json,
}

#[derive(Debug, Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,

    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    order: usize,

    #[tabled(rename = "Rollback step")]
    step: String,
}

fn display_option(opt: &Option<String>) -> String {
    opt.as_deref().unwrap_or("-").to_string()
}

/// Print a scenario report.
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report.to_json())
                .unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
        OutputFormat::Text => {
            let rows = vec![
                FieldRow {
                    field: "Node",
                    value: display_option(&report.node),
                },
                FieldRow {
                    field: "Agent",
                    value: display_option(&report.agent),
                },
                FieldRow {
                    field: "Baseline",
                    value: display_option(&report.baseline),
                },
                FieldRow {
                    field: "Applied",
                    value: display_option(&report.applied),
                },
                FieldRow {
                    field: "Restored",
                    value: display_option(&report.restored),
                },
            ];
            println!("{}", Table::new(rows));

            match &report.rollback {
                Some(rollback) => print_rollback(rollback, format),
                None => println!("{}", "No cluster changes were made.".dimmed()),
            }

            if report.is_success() {
                println!("{} {}", "Success:".green().bold(), "profile applied and rolled back");
            }
        }
    }
}

/// Print what rollback did.
pub fn print_rollback(report: &RollbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "attempted": report.attempted,
                "failures": report.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Text => {
            if report.attempted.is_empty() {
                println!("{}", "Nothing to roll back.".dimmed());
                return;
            }

            let rows: Vec<StepRow> = report
                .attempted
                .iter()
                .enumerate()
                .map(|(i, step)| StepRow {
                    order: i + 1,
                    step: step.to_string(),
                })
                .collect();
            println!("{}", Table::new(rows));

            for err in &report.failures {
                eprintln!("{} {}", "Rollback failed:".red().bold(), err);
            }
        }
    }
}
