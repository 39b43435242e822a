use super::{load_config, resolve_story};
use crate::output::print_json;
use clap::Subcommand;
use semad_core::contract;
use std::path::Path;

#[derive(Subcommand)]
pub enum ContractSubcommand {
    /// Validate the StoryContract in a story's front matter
    Validate {
        /// Story path, filename, or id (e.g. 1.2)
        story: String,
    },
}

pub fn run(root: &Path, subcmd: ContractSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ContractSubcommand::Validate { story } => validate(root, &story, json),
    }
}

fn validate(root: &Path, arg: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let path = resolve_story(root, &config, arg)?;
    let Some(value) = contract::extract_contract_from_file(&path)? else {
        anyhow::bail!("{} has no StoryContract in its front matter", path.display());
    };
    let report = contract::validate(&value);

    if json {
        print_json(&report)?;
    } else if report.valid {
        println!("StoryContract is valid: {}", path.display());
    } else {
        println!("StoryContract is invalid: {}", path.display());
        for line in contract::format_errors(&report.errors).lines() {
            println!("  {line}");
        }
    }

    if !report.valid {
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }
    Ok(())
}
