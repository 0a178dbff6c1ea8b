//! `strata load` command implementation

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use strata_loader::ProcessState;

use super::blocking;
use crate::error::CliResult;

/// Execute the `strata load` command
pub async fn run(
    state: Arc<ProcessState>,
    name: String,
    context: Option<String>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    let unit = blocking(move || {
        let unit = match context.as_deref() {
            Some(context) => state.load_code_unit_in(context, &name)?,
            None => state.load_code_unit(&name)?,
        };
        Ok(unit)
    })
    .await?;

    match output {
        Some(path) => {
            std::fs::write(&path, unit.bytes())?;
            println!(
                "{} {} ({} bytes) written to {}",
                "✓".green(),
                unit.name(),
                unit.len(),
                path.display()
            );
        }
        None => println!(
            "{} {} ({} bytes) from {}",
            "✓".green(),
            unit.name(),
            unit.len(),
            unit.origin()
        ),
    }
    Ok(())
}
