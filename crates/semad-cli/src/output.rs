//! Terminal output: pretty JSON for `--json`, aligned tables otherwise, and
//! the row layouts shared by the story, epic, run and workflow commands.

use semad_core::{
    devqa::StepRecord,
    orchestrator::RunRecord,
    story::{EpicStatus, StorySummary},
};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", render_table(headers, &rows));
}

/// Columns are padded to their widest cell, counted in chars so story titles
/// with non-ASCII text stay aligned. The last column is never padded.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = table_line(&widths, headers);
    let rules: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&table_line(&widths, &rules));
    for row in rows {
        out.push_str(&table_line(&widths, row));
    }
    out
}

fn table_line<S: AsRef<str>>(widths: &[usize], cells: &[S]) -> String {
    let last = cells.len().saturating_sub(1);
    let padded: Vec<String> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let cell = cell.as_ref();
            let width = widths.get(i).copied().unwrap_or(0);
            if i == last {
                cell.to_string()
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect();
    format!("{}\n", padded.join("  "))
}

// ---------------------------------------------------------------------------
// Row layouts
// ---------------------------------------------------------------------------

pub const STORY_HEADERS: &[&str] = &["ID", "STATUS", "TITLE"];

pub fn story_rows(stories: &[StorySummary]) -> Vec<Vec<String>> {
    stories
        .iter()
        .map(|s| {
            vec![
                s.story_id.clone().unwrap_or_else(|| "-".to_string()),
                s.status.to_string(),
                s.title.clone(),
            ]
        })
        .collect()
}

pub const EPIC_HEADERS: &[&str] = &["EPIC", "TOTAL", "DONE", "APPROVED", "IN PROGRESS", "COMPLETE"];

pub fn epic_row(epic: &str, status: &EpicStatus) -> Vec<String> {
    vec![
        epic.to_string(),
        status.total_stories.to_string(),
        status.completed_stories.to_string(),
        status.pending_stories.to_string(),
        status.in_progress_stories.to_string(),
        yes_no(status.is_complete).to_string(),
    ]
}

pub const RUN_HEADERS: &[&str] = &["STARTED", "STORY", "WORKFLOW", "FLOW", "OUTCOME", "ITER", "STATUS"];

pub fn run_rows(runs: &[RunRecord]) -> Vec<Vec<String>> {
    runs.iter()
        .map(|r| {
            vec![
                r.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.story_id.clone(),
                r.workflow.clone(),
                r.flow_type.to_string(),
                r.outcome.as_str().to_string(),
                r.total_iterations.to_string(),
                r.final_status.to_string(),
            ]
        })
        .collect()
}

pub const STEP_HEADERS: &[&str] = &["#", "STEP", "ITERATION", "ATTEMPTS"];

/// Setup and wrap-up steps show `-` for their iteration.
pub fn step_rows(steps: &[StepRecord]) -> Vec<Vec<String>> {
    steps
        .iter()
        .map(|s| {
            vec![
                s.index.to_string(),
                format!("{}/{}", s.agent, s.action),
                match s.iteration {
                    0 => "-".to_string(),
                    n => n.to_string(),
                },
                s.attempts.to_string(),
            ]
        })
        .collect()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
