use super::{load_config, resolve_story};
use crate::output::{print_json, print_table, story_rows, STORY_HEADERS};
use anyhow::Context;
use clap::Subcommand;
use semad_core::{
    contract,
    orchestrator,
    story::{self, Story},
    types::StoryStatus,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum StorySubcommand {
    /// List the stories of an epic in story order
    List { epic: String },
    /// Show the next Approved story (of an epic, or the most recent overall)
    Next {
        #[arg(long)]
        epic: Option<String>,
    },
    /// Show a story's title, status and contract summary
    Show {
        /// Story path, filename, or id (e.g. 1.2)
        story: String,
    },
    /// Set a story's status
    SetStatus {
        story: String,
        /// Draft, Approved, InProgress, Review or Done
        status: String,
    },
}

pub fn run(root: &Path, subcmd: StorySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StorySubcommand::List { epic } => list(root, &epic, json),
        StorySubcommand::Next { epic } => next(root, epic.as_deref(), json),
        StorySubcommand::Show { story } => show(root, &story, json),
        StorySubcommand::SetStatus { story, status } => set_status(root, &story, &status, json),
    }
}

fn list(root: &Path, epic: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let stories = story::list_stories_for_epic(&config.stories_path(root), epic)?;

    if json {
        return print_json(&stories);
    }
    if stories.is_empty() {
        println!("No stories for epic {epic}.");
        return Ok(());
    }
    print_table(STORY_HEADERS, story_rows(&stories));
    Ok(())
}

fn next(root: &Path, epic: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let dir = config.stories_path(root);

    match epic {
        Some(epic) => {
            let next = story::find_next_approved_story_in_epic(&dir, epic)?;
            if json {
                print_json(&next)?;
            } else {
                println!(
                    "{} {}  ({})",
                    next.story_id.as_deref().unwrap_or("-"),
                    next.title,
                    next.path.display()
                );
            }
        }
        None => {
            let next = story::find_next_approved_story(&dir)?;
            if json {
                print_json(&next)?;
            } else {
                println!("{}  ({})", next.title, next.path.display());
                if next.story_contract.is_none() {
                    println!("  (no StoryContract)");
                }
            }
        }
    }
    Ok(())
}

fn show(root: &Path, arg: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let path = resolve_story(root, &config, arg)?;
    let story = Story::load(&path)?;
    let report = story.contract.as_ref().map(contract::validate);

    if json {
        return print_json(&serde_json::json!({
            "story": story,
            "contract_valid": report.as_ref().map(|r| r.valid),
        }));
    }

    println!("{} ({})", story.title, story.story_id);
    println!("  path:     {}", story.path.display());
    println!("  status:   {}", story.status);
    match report {
        None => println!("  contract: missing"),
        Some(r) if r.valid => println!("  contract: valid"),
        Some(r) => println!("  contract: {} error(s)", r.errors.len()),
    }
    Ok(())
}

fn set_status(root: &Path, arg: &str, status: &str, json: bool) -> anyhow::Result<()> {
    let status: StoryStatus = status.parse()?;
    let config = load_config(root)?;
    let path = resolve_story(root, &config, arg)?;
    orchestrator::update_story_status(&path, status)
        .with_context(|| format!("failed to update {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({ "path": path, "status": status }))?;
    } else {
        println!("{} -> {status}", path.display());
    }
    Ok(())
}
