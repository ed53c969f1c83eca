//! toolgate - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;
use toolgate::{
    cli::{Args, Commands, EstimateArgs, Verbosity},
    config::Config,
    doctor::Doctor,
    estimate::TimeoutEstimate,
    logging::{self, LogSettings},
    NormalizedResponse, ResponseStatus, ToolError, ToolRequest, ToolRuntime,
};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    init_logging(&args, &config);
    debug!(command = ?args.command, "toolgate starting");

    match &args.command {
        Commands::Run(run) => {
            let runtime = ToolRuntime::from_config(&config)?;
            let code = invoke_and_print(&runtime, run.to_request(), args.verbosity()).await?;
            std::process::exit(code);
        }
        Commands::Call { file } => {
            let request = match read_request(file.as_ref()) {
                Ok(request) => request,
                Err(e) => {
                    let response = NormalizedResponse::from(e);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    std::process::exit(exit_code(&response));
                }
            };
            let runtime = ToolRuntime::from_config(&config)?;
            let code = invoke_and_print(&runtime, request, args.verbosity()).await?;
            std::process::exit(code);
        }
        Commands::Resolve { tool, tool_version } => {
            let runtime = ToolRuntime::from_config(&config)?;
            resolve(&runtime, tool, tool_version.as_deref()).await?;
        }
        Commands::Estimate(est) => {
            estimate(est)?;
        }
        Commands::Profiles => {
            let runtime = ToolRuntime::from_config(&config)?;
            list_profiles(&runtime);
        }
        Commands::Doctor => {
            let runtime = ToolRuntime::from_config(&config)?;
            run_doctor(&runtime).await?;
        }
        Commands::Config => {
            show_config(&args, &config)?;
        }
    }

    Ok(())
}

fn init_logging(args: &Args, config: &Config) {
    let level = if args.quiet || args.verbose > 0 {
        args.verbosity().log_level()
    } else {
        logging::parse_level(&config.logging.level).unwrap_or(tracing::Level::INFO)
    };
    logging::init_logging(LogSettings::with_level(level).json(args.log_json || config.logging.json));
}

/// Exit code for a response: 0 success, 1 error, 2 timeout
fn exit_code(response: &NormalizedResponse) -> i32 {
    match response.status {
        ResponseStatus::Success => 0,
        ResponseStatus::Error => 1,
        ResponseStatus::Timeout => 2,
    }
}

async fn invoke_and_print(
    runtime: &ToolRuntime,
    request: ToolRequest,
    verbosity: Verbosity,
) -> Result<i32> {
    let spinner = (verbosity.show_progress() && std::io::stderr().is_terminal())
        .then(|| running_spinner(&request.tool));

    let response = runtime.invoke(request).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(exit_code(&response))
}

fn running_spinner(tool: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("Running {}", tool));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Read one request; failures come back as the envelope the caller gets
fn read_request(file: Option<&PathBuf>) -> Result<ToolRequest, ToolError> {
    let contents = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path).map_err(|e| {
            ToolError::config(format!("cannot read request file {}: {}", path.display(), e))
        })?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| ToolError::config(format!("cannot read request from stdin: {}", e)))?;
            buf
        }
    };
    serde_json::from_str(&contents)
        .map_err(|e| ToolError::config(format!("invalid tool request: {}", e)))
}

async fn resolve(runtime: &ToolRuntime, tool: &str, version: Option<&str>) -> Result<()> {
    let target = match runtime.registry().get(tool, version) {
        Some(profile) => {
            runtime
                .resolver()
                .resolve_with(tool, profile.binary_name(), profile.image.as_deref())
                .await?
        }
        None if version.is_some() => {
            anyhow::bail!("No profile {}@{}", tool, version.unwrap_or_default())
        }
        None => runtime.resolver().resolve(tool).await?,
    };

    println!("{}", serde_json::to_string_pretty(&target)?);
    Ok(())
}

fn estimate(args: &EstimateArgs) -> Result<()> {
    let estimate = TimeoutEstimate {
        per_unit_timeout_secs: args.per_unit,
        units: args.units,
        concurrency: args.concurrency,
        retries: args.retries,
        buffer_secs: args.buffer,
        max_secs: args.max,
    };
    println!("{}", estimate.estimate_secs()?);
    Ok(())
}

fn list_profiles(runtime: &ToolRuntime) {
    let registry = runtime.registry();
    println!(
        "{:<14} {:<8} {:<12} {:<36} {}",
        "Tool".bold(),
        "Version".bold(),
        "Output".bold(),
        "Image".bold(),
        "Description".bold()
    );

    for name in registry.tool_names() {
        for version in registry.versions(&name) {
            if let Some(profile) = registry.get(&name, Some(&version)) {
                println!(
                    "{:<14} {:<8} {:<12} {:<36} {}",
                    profile.name,
                    profile.version,
                    profile.output.to_string(),
                    profile.image.as_deref().unwrap_or("-"),
                    profile.description.dimmed()
                );
            }
        }
    }
}

async fn run_doctor(runtime: &ToolRuntime) -> Result<()> {
    let working_dir = std::env::current_dir().context("Cannot determine working directory")?;
    let doctor = Doctor::new(
        runtime.resolver().clone(),
        runtime.registry().clone(),
        working_dir,
    );

    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let source = args
        .config
        .clone()
        .or_else(Config::default_path)
        .filter(|path| path.exists());

    match source {
        Some(path) => println!("{} {}\n", "Config file:".bold(), path.display()),
        None => println!("{}\n", "No config file, using built-in defaults".bold()),
    }

    print!("{}", config.to_toml()?);
    println!("\n{} {:?}", "Verbosity:".bold(), args.verbosity());
    Ok(())
}
