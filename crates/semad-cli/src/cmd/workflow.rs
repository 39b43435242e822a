use super::epic::{orchestrator, parse_flow};
use super::{block_on, load_config, resolve_story};
use crate::output::{print_json, print_table, step_rows, STEP_HEADERS};
use clap::Subcommand;
use semad_core::{
    executor::{WorkflowExecutor, WorkflowRun},
    logger::TracingLogger,
    step::{ConfiguredExecutor, StepContext},
    workflow::{self, StepKind},
};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum WorkflowSubcommand {
    /// List available workflows
    List,
    /// Show a workflow's steps
    Show { name: String },
    /// Run a workflow, optionally against a story
    Run {
        name: String,
        /// Story path, filename, or id; updates its status as the run progresses
        #[arg(long)]
        story: Option<String>,
        /// linear or iterative (default: from config)
        #[arg(long)]
        flow: Option<String>,
        /// Override workflow.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },
}

pub fn run(root: &Path, subcmd: WorkflowSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorkflowSubcommand::List => list(root, json),
        WorkflowSubcommand::Show { name } => show(root, &name, json),
        WorkflowSubcommand::Run {
            name,
            story,
            flow,
            max_iterations,
        } => run_workflow(root, &name, story.as_deref(), flow.as_deref(), max_iterations, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let names = workflow::list_workflows(root)?;
    if json {
        return print_json(&names);
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn show(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let wf = workflow::load_workflow(root, name)?;
    if json {
        return print_json(&serde_json::json!({
            "workflow": wf,
            "dev_qa": wf.is_dev_qa_workflow(),
        }));
    }

    println!("{}", wf.name);
    if let Some(desc) = &wf.description {
        println!("  {desc}");
    }
    let rows = wf
        .steps
        .iter()
        .map(|s| {
            vec![
                s.index.to_string(),
                s.agent.to_string(),
                s.action.clone(),
                kind_label(s.kind).to_string(),
                s.condition.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["#", "AGENT", "ACTION", "KIND", "CONDITION"], rows);
    if !wf.is_dev_qa_workflow() {
        println!("(no dev/qa pair: steps run once in order)");
    }
    Ok(())
}

fn kind_label(kind: StepKind) -> &'static str {
    match kind {
        StepKind::DevImplement => "implement",
        StepKind::DevAddressFeedback => "feedback",
        StepKind::QaReview => "review",
        StepKind::Task => "task",
    }
}

fn run_workflow(
    root: &Path,
    name: &str,
    story: Option<&str>,
    flow: Option<&str>,
    max_iterations: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(root)?;
    let flow_type = parse_flow(flow, &config)?;

    if let Some(story) = story {
        let path = resolve_story(root, &config, story)?;
        let orch = orchestrator(root, config, max_iterations, false);
        let report = block_on(orch.run_story_with(&path, name, flow_type))??;
        if json {
            return print_json(&report);
        }
        print_run(&report.run);
        println!("{} -> {}", report.story_id, report.final_status);
        return Ok(());
    }

    if let Some(n) = max_iterations {
        config.workflow.max_iterations = n;
    }
    let steps = Arc::new(ConfiguredExecutor::new(config.agents.clone(), root));
    let executor = WorkflowExecutor::new(root, config.workflow.clone(), steps)
        .with_logger(Arc::new(TracingLogger))
        .with_monitor(Arc::new(TracingLogger));
    let run = block_on(executor.execute_with(name, flow_type, &StepContext::new(name)))??;
    if json {
        return print_json(&run);
    }
    print_run(&run);
    Ok(())
}

fn print_run(run: &WorkflowRun) {
    println!("Workflow {} ({})", run.workflow, run.flow_type);
    print_table(STEP_HEADERS, step_rows(&run.steps));
    if run.dev_qa {
        let verdict = if run.qa_approved {
            "approved"
        } else if run.overridden {
            "accepted without approval"
        } else {
            "not approved"
        };
        println!("QA {verdict} after {} iteration(s)", run.total_iterations);
        if let Some(state) = run.final_state {
            println!("Final state: {state}");
        }
        for issue in run.outstanding_issues() {
            println!("  - [{}] {}", issue.severity, issue.message);
        }
    }
}
