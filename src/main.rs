use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use driftmeasure::cli::{Cli, Commands};
use driftmeasure::config::Config;
use driftmeasure::diagnostics::{CheckResult, all_available, check_node_types};
use driftmeasure::engine::gst::{GstEngine, list_sources};
use driftmeasure::logging::init_logging;
use driftmeasure::pipeline::{Orchestrator, RunOptions};
use driftmeasure::version_string;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("driftmeasure: failed to print help: {e}");
        }
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.wants_source_list() {
        print_sources()?;
        return Ok(ExitCode::SUCCESS);
    }

    match &cli.command {
        Some(Commands::Check) => return check_elements(),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "driftmeasure",
                &mut std::io::stdout(),
            );
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Sources) | None => {}
    }

    let config = load_config(&cli)?;
    let capture = config
        .capture
        .validate()
        .context("Invalid configuration")?;

    info!("driftmeasure {}", version_string());
    info!("Configuration:");
    for (key, value) in capture.summary() {
        info!("  {key}: {value}");
    }

    let engine = GstEngine::new()?;
    let options = RunOptions {
        dump_dir: config.diagnostics.dump_dir.clone(),
        handle_signals: true,
    };
    let orchestrator =
        Orchestrator::new(&capture, engine, options).context("Could not set up pipeline")?;
    let exit = orchestrator.run().await?;
    Ok(ExitCode::from(exit.exit_code()))
}

/// Defaults, then the config file, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        },
    }
    .with_env_overrides();
    cli.apply_to(&mut config);
    Ok(config)
}

fn print_sources() -> Result<()> {
    let sources = list_sources().context("Could not enumerate capture sources")?;
    println!("{} capture source(s) available", sources.len());
    for (idx, source) in sources.iter().enumerate() {
        println!();
        println!("#{}:", idx);
        println!("         name: \"{}\"", source.name);
        println!("  description: \"{}\"", source.description);
    }
    Ok(())
}

fn check_elements() -> Result<ExitCode> {
    let engine = GstEngine::new()?;
    let results = check_node_types(&engine);

    println!("Checking pipeline elements...\n");
    for (kind, result) in &results {
        print!("  {:<14}", kind.factory_name());
        match result {
            CheckResult::Ok => println!("{}", "✓ OK".green()),
            CheckResult::NotFound => println!("{}", "✗ NOT FOUND".red()),
        }
    }
    println!();

    if all_available(&results) {
        println!("{}", "✓ All pipeline elements are available.".green());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{}",
            "⚠ Some elements are missing. Check GST_PLUGIN_PATH and installed plugins.".yellow()
        );
        Ok(ExitCode::FAILURE)
    }
}
