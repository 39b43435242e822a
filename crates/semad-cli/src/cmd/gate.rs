use super::{load_config, resolve_story};
use crate::output::print_json;
use clap::Subcommand;
use semad_core::gate::{self, GateReport};
use std::path::Path;

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// PRD and architecture documents exist
    Planning,
    /// Story is Approved/InProgress with a valid StoryContract
    Dev { story: String },
    /// Story has been worked on and has a valid StoryContract
    Qa { story: String },
}

pub fn run(root: &Path, subcmd: GateSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let report = match subcmd {
        GateSubcommand::Planning => gate::check_planning_gate(root, &config),
        GateSubcommand::Dev { story } => {
            gate::check_dev_gate(&resolve_story(root, &config, &story)?)
        }
        GateSubcommand::Qa { story } => gate::check_qa_gate(&resolve_story(root, &config, &story)?),
    };

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.passed {
        anyhow::bail!("{} gate failed", report.gate);
    }
    Ok(())
}

fn print_report(report: &GateReport) {
    let verdict = if report.passed { "PASSED" } else { "FAILED" };
    println!("{} gate: {verdict}", report.gate);
    for check in &report.checks {
        let mark = if check.passed { "x" } else { " " };
        let mut lines = check.detail.lines();
        println!("  [{mark}] {}: {}", check.name, lines.next().unwrap_or_default());
        for line in lines {
            println!("        {line}");
        }
    }
}
