//! Doctor command - run database health checks

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use petsite_core::services::CheckStatus;
use serde_json::Value;

use super::get_context;
use crate::output;

/// Format a detail JSON value for display
fn format_detail(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let shown = match v {
                    Value::String(s) if s.chars().count() > 40 => {
                        format!("{}...", s.chars().take(37).collect::<String>())
                    }
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items
                        .iter()
                        .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => other.to_string(),
                };
                format!("{}: {}", k, shown)
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

/// Returns whether every check passed without errors
pub fn run(verbose: bool, json: bool) -> Result<bool> {
    let ctx = get_context()?;
    let result = ctx.doctor_service.run_checks()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.is_healthy());
    }

    println!("{}", "Petsite Health Check".bold());
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["Check", "Status", "Message"]);

    for (name, check) in &result.checks {
        let status = match check.status {
            CheckStatus::Pass => Cell::new("PASS").fg(Color::Green),
            CheckStatus::Warning => Cell::new("WARN").fg(Color::Yellow),
            CheckStatus::Error => Cell::new("ERROR").fg(Color::Red),
        };
        table.add_row(vec![Cell::new(name), status, Cell::new(&check.message)]);

        if verbose {
            for detail in check.details.iter().flatten() {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(format!("  - {}", format_detail(detail))),
                ]);
            }
        }
    }

    println!("{}", table);
    println!();
    println!(
        "Summary: {} passed, {} warnings, {} errors",
        result.summary.passed.to_string().green(),
        result.summary.warnings.to_string().yellow(),
        result.summary.errors.to_string().red(),
    );

    Ok(result.is_healthy())
}
