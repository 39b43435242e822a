use crate::output::{print_json, print_table, run_rows, RUN_HEADERS};
use semad_core::orchestrator;
use std::path::Path;

pub fn run(root: &Path, story: Option<&str>, json: bool) -> anyhow::Result<()> {
    let runs: Vec<_> = orchestrator::list_runs(root)?
        .into_iter()
        .filter(|r| story.map_or(true, |s| r.story_id == s))
        .collect();

    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    print_table(RUN_HEADERS, run_rows(&runs));
    Ok(())
}
