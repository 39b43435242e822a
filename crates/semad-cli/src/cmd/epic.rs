use super::{block_on, load_config};
use crate::output::{epic_row, print_json, print_table, EPIC_HEADERS};
use clap::Subcommand;
use semad_core::{
    config::Config,
    executor::WorkflowExecutor,
    logger::TracingLogger,
    orchestrator::{EpicLoopReport, Orchestrator},
    step::ConfiguredExecutor,
    story,
    types::FlowType,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum EpicSubcommand {
    /// Show story counts for an epic
    Status { epic: String },
    /// Run the configured workflow over every Approved story of an epic
    Run {
        epic: String,
        /// linear or iterative (default: from config)
        #[arg(long)]
        flow: Option<String>,
        /// Override workflow.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Accept a story when QA still rejects it after the last iteration
        #[arg(long)]
        accept_on_exhaustion: bool,
    },
}

pub fn run(root: &Path, subcmd: EpicSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EpicSubcommand::Status { epic } => status(root, &epic, json),
        EpicSubcommand::Run {
            epic,
            flow,
            max_iterations,
            accept_on_exhaustion,
        } => run_epic(
            root,
            &epic,
            flow.as_deref(),
            max_iterations,
            accept_on_exhaustion,
            json,
        ),
    }
}

fn status(root: &Path, epic: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let status = story::compute_epic_status(&config.stories_path(root), epic)?;

    if json {
        return print_json(&status);
    }
    print_table(EPIC_HEADERS, vec![epic_row(epic, &status)]);
    Ok(())
}

/// Build an orchestrator from the project config and CLI overrides.
pub fn orchestrator(
    root: &Path,
    mut config: Config,
    max_iterations: Option<u32>,
    accept_on_exhaustion: bool,
) -> Orchestrator {
    if let Some(n) = max_iterations {
        config.workflow.max_iterations = n;
    }
    let steps = Arc::new(ConfiguredExecutor::new(config.agents.clone(), root));
    let mut executor = WorkflowExecutor::new(root, config.workflow.clone(), steps)
        .with_logger(Arc::new(TracingLogger))
        .with_monitor(Arc::new(TracingLogger));
    if accept_on_exhaustion {
        executor = executor.on_max_iterations_reached(Box::new(|iterations, issues| {
            tracing::warn!(
                iterations,
                issues = issues.len(),
                "accepting story without QA approval"
            );
            true
        }));
    }
    Orchestrator::new(root, config, executor)
}

pub fn parse_flow(flow: Option<&str>, config: &Config) -> anyhow::Result<FlowType> {
    match flow {
        Some(f) => Ok(f.parse()?),
        None => Ok(config.workflow.flow_type),
    }
}

fn run_epic(
    root: &Path,
    epic: &str,
    flow: Option<&str>,
    max_iterations: Option<u32>,
    accept_on_exhaustion: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let flow_type = parse_flow(flow, &config)?;
    let orch = orchestrator(root, config, max_iterations, accept_on_exhaustion);
    let report = block_on(orch.execute_epic_loop(epic, flow_type))??;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &EpicLoopReport) {
    println!(
        "Epic {}: {} story(ies) processed, {}/{} done{}",
        report.epic_id,
        report.processed_stories,
        report.status.completed_stories,
        report.status.total_stories,
        if report.epic_completed {
            " (epic complete)"
        } else {
            ""
        }
    );
    for failure in &report.failures {
        println!("  not done: {} ({})", failure.story_id, failure.reason);
    }
}
