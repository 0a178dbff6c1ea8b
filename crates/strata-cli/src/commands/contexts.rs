//! `strata contexts` command implementation

use std::sync::Arc;

use colored::Colorize;
use strata_loader::{ContextSummary, ProcessState};

use super::blocking;
use crate::error::CliResult;

/// Execute the `strata contexts` command
pub async fn run(state: Arc<ProcessState>, json: bool, all: bool) -> CliResult<()> {
    let summaries = blocking(move || {
        let manager = state.context_manager()?;
        if all {
            for name in manager.configured_names() {
                manager.get(&name)?;
            }
        }
        Ok(manager.snapshot())
    })
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_table(&summaries);
    }
    Ok(())
}

fn print_table(summaries: &[ContextSummary]) {
    if summaries.is_empty() {
        println!("No live contexts");
        return;
    }

    for summary in summaries {
        println!(
            "{} {} [{:?}] generation {}, {} entries",
            "•".cyan(),
            summary.name.bold(),
            summary.status,
            summary.layer.generation,
            summary.layer.entries.len()
        );
        for entry in &summary.layer.entries {
            println!("    {entry}");
        }
    }
}
