mod client;
mod serve;

use anyhow::{Result, anyhow};
use console::style;
use std::path::PathBuf;

use crate::core::config::RunboardConfig;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Start the run board API (--host, --port, --db)")
        .command("health", "Check a running server")
        .command("logs", "Follow the server log feed")
        .print();

    GuideSection::new("Agents")
        .command("agents list [--all]", "List active agents (or all)")
        .command("agents get <id>", "Show one agent")
        .command(
            "agents create",
            "--name --role --goal --backstory [--description] or --json",
        )
        .command("agents update <id>", "Patch fields via flags or --json")
        .command("agents activate <id>", "Mark an agent active")
        .command("agents deactivate <id>", "Mark an agent inactive")
        .print();

    GuideSection::new("Runs")
        .command("runs list [--agent <id>]", "List runs, newest first")
        .command("runs start <agent_id> --input <text>", "Start a run")
        .command("runs get <id>", "Show a run with its outputs")
        .command("runs status <id> <status>", "Set pending|running|completed|failed")
        .command("runs output <id> --type <t> --content <c>", "Record an output")
        .command("runs outputs <id>", "List a run's outputs")
        .command("runs watch <id>", "Follow a run until it finishes")
        .print();

    println!(
        "\n {} {} <command> [subcommand] [--api-url <url>]\n",
        style("Usage:").bold(),
        style(NativePlatform::binary_name()).green()
    );
}

/// Overrides for `serve`; unset values come from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<PathBuf>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> Result<ServeFlags> {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    flags.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    let port = args[i + 1]
                        .parse()
                        .map_err(|_| anyhow!("invalid --port value '{}'", args[i + 1]))?;
                    flags.port = Some(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--db" => {
                if i + 1 < args.len() {
                    flags.db = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok(flags)
}

pub(crate) fn apply_serve_flags(config: &mut RunboardConfig, flags: &ServeFlags) {
    if let Some(host) = &flags.host {
        config.server.host = host.clone();
    }
    if let Some(port) = flags.port {
        config.server.port = port;
    }
    if let Some(db) = &flags.db {
        config.store.path = db.clone();
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let data_dir = NativePlatform::data_dir();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" => {
            let flags = parse_serve_flags(&args, 2)?;
            serve::run_server(&data_dir, flags).await
        }
        "health" | "logs" | "agents" | "agent" | "runs" | "run" => {
            let config = RunboardConfig::load(&data_dir).await?;
            let default_url = format!("http://{}:{}", config.server.host, config.server.port);
            client::run_client_command(&args, &default_url).await
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
            Ok(())
        }
    }
}
