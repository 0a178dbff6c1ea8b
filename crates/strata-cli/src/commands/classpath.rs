//! `strata classpath` command implementation

use std::sync::Arc;

use strata_loader::ProcessState;

use super::blocking;
use crate::error::CliResult;

/// Execute the `strata classpath` command
pub async fn run(state: Arc<ProcessState>, json: bool) -> CliResult<()> {
    let diagnostics = blocking(move || Ok(state.diagnostics()?)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        print!("{diagnostics}");
    }
    Ok(())
}
