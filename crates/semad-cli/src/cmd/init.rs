use anyhow::Context;
use semad_core::{config::Config, io, paths, workflow};
use std::path::Path;

const STORY_TEMPLATE: &str = r#"---
StoryContract:
  version: "1.0"
  story_id: "1.1"
  epic_id: "1"
  apiEndpoints: []
  filesToModify:
    - path: README.md
      reason: Describe the project
  acceptanceCriteriaLinks: []
---
# Story 1.1: Example story

## Status
Draft

## Story
As a developer, I want an example story, so that I can see the expected format.

## Acceptance Criteria
1. The README describes the project.
"#;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing semad in: {}", root.display());

    for dir in [paths::SEMAD_DIR, paths::WORKFLOWS_DIR, paths::RUNS_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config = if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config")?
    } else {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    for (name, yaml) in workflow::builtin_workflows() {
        let path = paths::workflow_path(root, name);
        let rel = format!("{}/{name}.yaml", paths::WORKFLOWS_DIR);
        if io::write_if_missing(&path, yaml.as_bytes())? {
            println!("  created: {rel}");
        } else {
            println!("  exists:  {rel}");
        }
    }

    let stories = config.stories_path(root);
    io::ensure_dir(&stories)?;
    let has_stories = std::fs::read_dir(&stories)?.next().is_some();
    if !has_stories {
        let example = stories.join("1.1.example-story.md");
        io::write_if_missing(&example, STORY_TEMPLATE.as_bytes())?;
        println!("  created: {}", example.strip_prefix(root).unwrap_or(&example).display());
    }

    println!("\nsemad initialized successfully.");
    println!("Next: semad story list 1");
    Ok(())
}
