use super::{Summary, plan_all, print_diagnostics, print_plan};
use crate::workspace::Workspace;
use colored::Colorize;
use stackmig_framework::CancelToken;
use stackmig_provider::StackMigrationResource;

pub async fn handle(
    ws: &Workspace,
    resource: &StackMigrationResource,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    println!("{}", "Planning stack migrations...".blue());
    let state = ws.state.load().await?;
    let planned = plan_all(ws, &state, resource, cancel).await?;

    let mut failed = false;
    println!();
    for p in &planned {
        print_diagnostics(&p.key, &p.diagnostics);
        failed |= p.diagnostics.has_error();
        if let Some(plan) = &p.plan {
            print_plan(&p.key, plan);
        }
    }

    if failed {
        anyhow::bail!("planning failed");
    }

    let summary = Summary::count(planned.iter().map(|p| p.action()));
    println!();
    if summary.is_empty() {
        println!("{}", "No changes. Stack migrations are up to date.".green());
    } else {
        println!("{} {}", "Plan:".bold(), summary);
    }
    Ok(())
}
