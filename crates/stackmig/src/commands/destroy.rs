use super::print_diagnostics;
use crate::workspace::{self, Workspace};
use colored::Colorize;
use stackmig_framework::{CancelToken, Resource};
use stackmig_provider::StackMigrationResource;

/// Forget every recorded migration. The platform keeps its stacks.
pub async fn handle(
    ws: &Workspace,
    resource: &StackMigrationResource,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let lock = ws.state.acquire_lock().await?;
    let mut state = ws.state.load().await?;
    let recorded = workspace::recorded(&state)?;

    if recorded.is_empty() {
        lock.release().await?;
        println!("{}", "No stack migrations in state.".dimmed());
        return Ok(());
    }

    for (key, prior) in recorded {
        let diagnostics = resource.delete(cancel, prior).await;
        print_diagnostics(&key, &diagnostics);
        workspace::record(&mut state, &key, None)?;
        println!("  {} {} removed from state", "-".red().bold(), key.cyan());
    }

    ws.state.save(&state).await?;
    lock.release().await?;
    Ok(())
}
