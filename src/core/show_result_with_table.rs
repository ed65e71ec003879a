use prettytable::{format, row, Cell, Row, Table};

use crate::models::result::{ExecutionReport, ExecutionSummary, StepResult};

fn assertion_summary(result: &StepResult) -> String {
    let passed = result.assertions.iter().filter(|a| a.passed).count();
    format!("{}/{}", passed, result.assertions.len())
}

fn failure_note(result: &StepResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    let mut notes: Vec<String> = result
        .assertions
        .iter()
        .filter(|a| !a.passed)
        .map(|a| match &a.error {
            Some(e) => format!("{}: {}", a.kind, e),
            None => format!("{}: expected {} got {}", a.kind, a.expected, a.actual),
        })
        .collect();
    notes.extend(
        result
            .extractions
            .iter()
            .filter(|e| !e.success)
            .map(|e| format!("extract {}: {}", e.to_field, e.error_msg.as_deref().unwrap_or("failed"))),
    );
    notes.join("; ")
}

pub fn build_step_table(report: &ExecutionReport) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(row!["#", "name", "method", "url", "status", "ok", "time", "assertions", "notes"]);
    for result in &report.results {
        let ok = if result.success { "PASS" } else { "FAIL" };
        table.add_row(Row::new(vec![
            Cell::new(&result.step_order.to_string()),
            Cell::new(&result.api_name),
            Cell::new(result.method.as_str()),
            Cell::new(&result.url),
            Cell::new(&result.status_code.to_string()),
            Cell::new(ok).style_spec(if result.success { "Fg" } else { "Fr" }),
            Cell::new(&format!("{:.2}ms", result.duration * 1000.0)),
            Cell::new(&assertion_summary(result)),
            Cell::new(&failure_note(result)),
        ]));
    }
    table
}

pub fn build_summary_table(summary: &ExecutionSummary) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(row!["steps", "passed", "failed", "assertions", "passed", "failed", "success rate"]);
    table.add_row(row![
        summary.total_steps,
        summary.success_steps,
        summary.failed_steps,
        summary.total_assertions,
        summary.passed_assertions,
        summary.failed_assertions,
        format!("{:.2}%", summary.success_rate)
    ]);
    table
}

pub fn show_result_with_table(report: &ExecutionReport) {
    println!(
        "execution {} [{}] {} in {:.3}s{}",
        report.execution_id,
        report.environment,
        report.status,
        report.duration,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    if report.results.is_empty() {
        println!("no steps");
        return;
    }
    build_step_table(report).printstd();
    build_summary_table(&report.summary).printstd();
}
