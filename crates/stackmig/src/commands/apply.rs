use super::{Summary, plan_all, print_diagnostics, print_plan};
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

    println!("{}", "Planning stack migrations...".blue());
    let planned = plan_all(ws, &state, resource, cancel).await?;

    let mut failed = false;
    for p in &planned {
        print_diagnostics(&p.key, &p.diagnostics);
        failed |= p.diagnostics.has_error();
    }
    if failed {
        lock.release().await?;
        anyhow::bail!("planning failed, nothing applied");
    }

    let summary = Summary::count(planned.iter().map(|p| p.action()));
    if summary.is_empty() {
        lock.release().await?;
        println!("{}", "No changes. Stack migrations are up to date.".green());
        return Ok(());
    }
    println!("{} {}", "Plan:".bold(), summary);

    for p in planned {
        if let Some(plan) = &p.plan {
            if !plan.has_changes() {
                continue;
            }
            println!();
            print_plan(&p.key, plan);
        }

        let applied = harness::apply_instance(resource, cancel, p).await;
        print_diagnostics(&applied.key, &applied.diagnostics);
        failed |= applied.diagnostics.has_error();

        // persist after every instance so an interrupted apply keeps progress
        workspace::record(&mut state, &applied.key, applied.state.as_ref())?;
        ws.state.save(&state).await?;

        match &applied.state {
            Some(s) => println!(
                "  {} {} {}",
                if applied.diagnostics.has_error() { "✗".red() } else { "✓".green() },
                applied.key.cyan(),
                format!("configuration {} is {}", s.current_configuration_id, s.config_status)
                    .dimmed()
            ),
            None => println!("  {} {} removed from state", "✓".green(), applied.key.cyan()),
        }
    }

    lock.release().await?;
    println!();
    if failed {
        anyhow::bail!("apply finished with errors");
    }
    println!("{}", "Apply complete.".green().bold());
    Ok(())
}
