//! Strata CLI - Inspect, load from and watch layered code-unit classpaths

mod cli;
mod commands;
mod error;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use strata_loader::ProcessState;
use tokio::runtime::Handle;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let mut config = commands::load_config(cli.config.as_deref())?;
    if let Commands::Watch {
        interval_ms: Some(ms),
        ..
    } = &cli.command
    {
        config.monitor_interval_ms = *ms;
    }

    let state = Arc::new(
        ProcessState::builder(config)
            .with_remote(!cli.offline)
            .with_runtime(Handle::current())
            .build(),
    );

    let result = match cli.command {
        Commands::Classpath { json } => commands::classpath::run(Arc::clone(&state), json).await,
        Commands::Load {
            name,
            context,
            output,
        } => commands::load::run(Arc::clone(&state), name, context, output).await,
        Commands::Contexts { json, all } => {
            commands::contexts::run(Arc::clone(&state), json, all).await
        }
        Commands::Watch {
            contexts,
            duration_ms,
            ..
        } => commands::watch::run(Arc::clone(&state), contexts, duration_ms).await,
    };

    // the last reference may own blocking resources
    commands::blocking(move || {
        state.shutdown();
        Ok(())
    })
    .await?;

    result.map_err(Into::into)
}
