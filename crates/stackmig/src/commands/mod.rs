pub mod apply;
pub mod destroy;
pub mod plan;
pub mod refresh;

use crate::harness::{self, Planned};
use crate::workspace::{self, Workspace};
use colored::Colorize;
use stackmig_framework::{ActionType, CancelToken, Diagnostics, GlobalState, Plan, Severity};
use stackmig_provider::{StackMigrationModel, StackMigrationResource};
use std::collections::BTreeSet;

/// Plan every migration in the config or in state
pub(crate) async fn plan_all(
    ws: &Workspace,
    state: &GlobalState,
    resource: &StackMigrationResource,
    cancel: &CancelToken,
) -> anyhow::Result<Vec<Planned<StackMigrationModel>>> {
    let mut recorded = workspace::recorded(state)?;
    let keys: BTreeSet<String> = ws
        .config
        .migrations
        .keys()
        .chain(recorded.keys())
        .cloned()
        .collect();

    let mut planned = Vec::with_capacity(keys.len());
    for key in keys {
        let config = ws.config.migrations.get(&key).cloned();
        let prior = recorded.remove(&key);
        planned.push(harness::plan_instance(resource, cancel, &key, config, prior).await?);
    }
    Ok(planned)
}

pub(crate) fn print_diagnostics(key: &str, diagnostics: &Diagnostics) {
    for d in diagnostics.iter() {
        let label = match d.severity {
            Severity::Error => "Error".red().bold(),
            Severity::Warning => "Warning".yellow().bold(),
        };
        match &d.attribute {
            Some(path) => eprintln!("{}: {} ({}.{})", label, d.summary, key, path),
            None => eprintln!("{}: {} ({})", label, d.summary, key),
        }
        for line in d.detail.lines() {
            eprintln!("  {}", line);
        }
    }
}

fn symbol(action: ActionType) -> colored::ColoredString {
    match action {
        ActionType::Create => "+".green().bold(),
        ActionType::Update => "~".yellow().bold(),
        ActionType::Replace => "-/+".red().bold(),
        ActionType::Delete => "-".red().bold(),
        ActionType::NoOp => " ".normal(),
    }
}

fn render(value: &serde_json::Value) -> String {
    if value.is_null() {
        "(null)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

pub(crate) fn print_plan(key: &str, plan: &Plan) {
    if !plan.has_changes() {
        return;
    }
    println!(
        "  {} {} {}",
        symbol(plan.action_type),
        key.cyan(),
        format!("({})", plan.action_type).dimmed()
    );
    for change in &plan.changes {
        let forces = if change.requires_replace {
            format!(" {}", "# forces replacement".red())
        } else {
            String::new()
        };
        match plan.action_type {
            ActionType::Create => println!("      {} = {}", change.name, render(&change.after)),
            ActionType::Delete => println!("      {} = {}", change.name, render(&change.before)),
            _ => println!(
                "      {}: {} -> {}{}",
                change.name,
                render(&change.before),
                render(&change.after),
                forces
            ),
        }
    }
}

/// Counts per action, for the summary line
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl Summary {
    pub fn count(actions: impl IntoIterator<Item = Option<ActionType>>) -> Self {
        let mut summary = Self::default();
        for action in actions.into_iter().flatten() {
            match action {
                ActionType::Create => summary.create += 1,
                ActionType::Update => summary.update += 1,
                ActionType::Replace => summary.replace += 1,
                ActionType::Delete => summary.delete += 1,
                ActionType::NoOp => {}
            }
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}
