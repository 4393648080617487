//! `kadai list` and `kadai run`.

use std::io::{BufRead, Write};

use {
    anyhow::{Context, bail},
    kadai_actions::{Action, Origin, WhichCache, resolve_command},
    kadai_plugins::LiveActions,
    tracing::info,
};

use crate::Project;

pub fn list(project: &Project, json: bool, all: bool) -> anyhow::Result<()> {
    let live = LiveActions::load(&project.paths, &project.config);
    let actions: Vec<Action> = live
        .actions()
        .into_iter()
        .filter(|a| all || !a.meta.hidden)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }
    if actions.is_empty() {
        println!(
            "No actions found. Add scripts to {}",
            project.paths.actions_dir().display()
        );
        return Ok(());
    }
    for action in &actions {
        println!("{}", format_line(action));
    }
    Ok(())
}

fn format_line(action: &Action) -> String {
    let emoji = action.meta.emoji.as_deref().unwrap_or("•");
    let origin = match &action.origin {
        Origin::Local => String::new(),
        Origin::Global => " [global]".into(),
        Origin::Plugin { name } => format!(" [{name}]"),
    };
    match &action.meta.description {
        Some(desc) => format!(
            "  {emoji} {id:<28} {name}: {desc}{origin}",
            id = action.id,
            name = action.meta.name
        ),
        None => format!(
            "  {emoji} {id:<28} {name}{origin}",
            id = action.id,
            name = action.meta.name
        ),
    }
}

/// Run the action `id`, returning the script's exit code.
pub async fn run(project: &Project, id: &str, yes: bool, args: &[String]) -> anyhow::Result<i32> {
    let live = LiveActions::load(&project.paths, &project.config);
    let Some(action) = live.find(id) else {
        bail!("unknown action '{id}' (see `kadai list --all`)");
    };

    if action.meta.confirm && !yes && !prompt(&format!("Run {}?", action.meta.name))? {
        eprintln!("Aborted.");
        return Ok(1);
    }

    let which = WhichCache::new();
    let argv = resolve_command(action, &which);
    let Some((program, rest)) = argv.split_first() else {
        bail!("could not resolve a command for '{id}'");
    };
    info!(action = %action.id, ?argv, "running action");

    let status = tokio::process::Command::new(program)
        .args(rest)
        .args(args)
        .current_dir(&project.paths.project_root)
        .env("KADAI_PROJECT_ROOT", &project.paths.project_root)
        .env("KADAI_ACTION_ID", &action.id)
        .status()
        .await
        .with_context(|| format!("failed to start {program}"))?;
    Ok(status.code().unwrap_or(1))
}

fn prompt(question: &str) -> anyhow::Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(is_affirmative(&line))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
