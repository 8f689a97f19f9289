//! Worthy CLI - Mastering Engine
//!
//! Command-line interface for the Worthy mastering engine.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worthy::cli::{commands, ChainFormat, Cli, Commands};
use worthy::EngineConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Worthy v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load(cli.config.as_deref()).context("loading engine config")?;

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Worthy v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &EngineConfig) -> anyhow::Result<()> {
    let result = match cmd {
        Commands::Probe { input } => commands::probe(&input),
        Commands::Measure { input, settings } => {
            commands::measure(&input, settings.as_deref(), config)
        }
        Commands::Chain { settings, format } => {
            commands::chain(settings.as_deref(), format == ChainFormat::Json)
        }
        Commands::Render {
            input,
            output,
            settings,
            backend,
        } => commands::render(
            &input,
            &output,
            settings.as_deref(),
            backend.map(Into::into),
            config,
        ),
        Commands::Preview {
            input,
            output,
            settings,
            bypass,
        } => commands::preview(&input, &output, settings.as_deref(), bypass, config),
    };

    result.map_err(|e| {
        for suggestion in e.recovery_suggestions() {
            eprintln!("  hint: {}", suggestion);
        }
        anyhow::anyhow!(e.friendly_message())
    })
}
