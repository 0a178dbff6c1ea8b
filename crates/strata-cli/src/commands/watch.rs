//! `strata watch` command implementation
//!
//! Keeps the default chain (and any requested contexts) alive, printing every
//! reload until Ctrl-C or the optional deadline.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use strata_loader::{HotReloadSupervisor, ProcessState, ReloadEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::blocking;
use crate::error::CliResult;

/// Execute the `strata watch` command
pub async fn run(
    state: Arc<ProcessState>,
    contexts: Vec<String>,
    duration_ms: Option<u64>,
) -> CliResult<()> {
    let supervisors = blocking(move || {
        let mut supervisors = vec![Arc::clone(state.default_accessor()?.supervisor())];
        for name in &contexts {
            supervisors.push(Arc::clone(state.context(name)?.supervisor()));
        }
        Ok(supervisors)
    })
    .await?;

    for supervisor in &supervisors {
        println!(
            "{} {} tier ({:?}, generation {}, {} monitored)",
            "Watching".bold(),
            supervisor.tier(),
            supervisor.status(),
            supervisor.generation(),
            supervisor.monitored_paths().len()
        );
        spawn_listener(supervisor);
    }

    match duration_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => tokio::signal::ctrl_c().await?,
    }
    println!("Shutting down");
    Ok(())
}

fn spawn_listener(supervisor: &HotReloadSupervisor) {
    let mut events = supervisor.subscribe();
    let tier = supervisor.tier().to_string();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ReloadEvent::Swapped {
                    generation,
                    entries,
                }) => println!(
                    "{} {} -> generation {} ({} entries)",
                    "↻".green(),
                    tier,
                    generation,
                    entries
                ),
                Ok(ReloadEvent::ReloadFailed { error }) => {
                    eprintln!("{} {} reload failed: {}", "✗".red(), tier, error)
                }
                Ok(ReloadEvent::Stopped) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} reload events for {}", skipped, tier)
                }
            }
        }
    });
}
