use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod common;

use client::error::SsoError;
use commands::LoginCommand;

/// File the debug log is written to
const DEBUG_LOG_FILE: &str = "ssocli.log";

#[derive(Parser)]
#[command(
    name = "ssocli",
    about = "Log in to an AWS SSO directory and store temporary STS credentials",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(flatten)]
    login: LoginCommand,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write a trace log to ssocli.log. Warning: the log may contain credentials
    #[arg(short = 'D', long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }

    print_banner();
    if cli.debug {
        println!(
            "⚠️  Debug logging to {} - the file may contain credentials and session tokens",
            DEBUG_LOG_FILE
        );
    }

    if let Err(e) = client::run(cli.login, cli.verbose || cli.debug).await {
        match e.downcast_ref::<SsoError>() {
            Some(sso_error) => {
                error!("{} failed: {}", sso_error.step(), sso_error);
                eprintln!("❌ {} failed: {}", sso_error.step(), sso_error);
            }
            None => {
                error!("{:#}", e);
                eprintln!("❌ {:#}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };
    let filter = EnvFilter::try_new(format!("warn,ssocli={}", level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    if cli.debug {
        let file = File::create(DEBUG_LOG_FILE)
            .with_context(|| format!("Failed to create {}", DEBUG_LOG_FILE))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn print_banner() {
    println!();
    println!("🔐 AWS SSO CLI");
    let _ = io::stdout().flush();
}
