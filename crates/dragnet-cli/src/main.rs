//! dragnet - a parallel research-orchestration tool server.
//!
//! Serves research tools over stdio-framed JSON-RPC. All logging goes to
//! stderr; stdout belongs to the transport.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod supervisor;
mod telemetry;

use dragnet_config::settings::Settings;
use dragnet_config::tools_file::ToolsFile;
use dragnet_server::transport::StdioTransport;
use dragnet_server::{McpServer, build_registry};
use supervisor::Supervisor;

/// dragnet - parallel research orchestration over the tool protocol.
#[derive(Parser)]
#[command(name = "dragnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a tool-definition file (defaults to the embedded table)
    #[arg(long, global = true)]
    tools: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tool protocol on stdin/stdout (the default)
    Serve,

    /// Print the tool table and capability status, then exit
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::from_env();
    let tools_file = match &cli.tools {
        Some(path) => ToolsFile::load_path(path)
            .with_context(|| format!("loading tool definitions from {}", path.display()))?,
        None => ToolsFile::load_default().context("loading embedded tool definitions")?,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Tools => {
            print_tools(&settings, &tools_file);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Serve => serve(&settings, &tools_file).await,
    }
}

async fn serve(settings: &Settings, tools_file: &ToolsFile) -> Result<ExitCode> {
    let supervisor = Supervisor::install();
    let shutdown = supervisor.shutdown_token();

    let registry = build_registry(settings, tools_file, shutdown.clone())
        .context("building tool registry")?;
    let capabilities = settings.capabilities();
    info!(
        tools = registry.len(),
        enabled = ?capabilities.enabled_tags(),
        "dragnet starting"
    );

    let server = McpServer::new(Arc::new(registry), shutdown.clone());
    let serve_task = tokio::spawn(async move {
        let mut transport = StdioTransport::new();
        server.run(&mut transport).await
    });

    match serve_task.await {
        Ok(Ok(())) => {
            info!("transport loop ended; shutting down");
        },
        Ok(Err(e)) => {
            error!(error = %e, "transport failure");
            supervisor.mark_fatal();
        },
        Err(join_error) => {
            // A panic escaping the serve loop leaves the process in an
            // indeterminate state; report and exit non-zero.
            error!(error = %join_error, "serve task aborted");
            supervisor.mark_fatal();
        },
    }

    supervisor.trigger_shutdown();
    if supervisor.is_fatal() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_tools(settings: &Settings, tools_file: &ToolsFile) {
    let capabilities = settings.capabilities();
    println!("{:<16} {:<16} {:<9} description", "tool", "capability", "enabled");
    for entry in &tools_file.tools {
        let capability = entry.capability.as_deref().unwrap_or("-");
        let enabled = entry
            .capability
            .as_deref()
            .is_none_or(|tag| capabilities.is_enabled(tag));
        println!(
            "{:<16} {:<16} {:<9} {}",
            entry.name, capability, enabled, entry.description
        );
    }
}
