use super::print_diagnostics;
use crate::harness;
use crate::workspace::{self, Workspace};
use colored::Colorize;
use stackmig_framework::CancelToken;
use stackmig_provider::StackMigrationResource;

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

    println!("{}", "Refreshing stack migrations...".blue());
    let mut failed = false;
    for (key, prior) in recorded {
        let refreshed = harness::refresh_instance(resource, cancel, &key, prior).await;
        print_diagnostics(&key, &refreshed.diagnostics);
        failed |= refreshed.diagnostics.has_error();
        workspace::record(&mut state, &key, refreshed.state.as_ref())?;

        if let Some(s) = &refreshed.state {
            println!(
                "  {} configuration {} is {}",
                key.cyan(),
                s.current_configuration_id,
                s.config_status
            );
        }
    }

    ws.state.save(&state).await?;
    lock.release().await?;
    if failed {
        anyhow::bail!("refresh finished with errors");
    }
    Ok(())
}
