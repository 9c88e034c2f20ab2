/*
 * tenback - per-tenant backup and restore for a Recbase record store
 *
 * SPDX-License-Identifier: Apache-2.0
 */
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![warn(clippy::default_trait_access)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::match_same_arms)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_wraps)]
#![warn(clippy::unused_async)]

use std::{io::IsTerminal, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use tenback::{
    cli,
    config::{self, ConfigLoad},
};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            1
        }
    };
    std::process::exit(i32::from(code));
}

async fn run() -> Result<u8> {
    let args = cli::Cli::parse();

    let path = config::resolve_config_path(args.config.as_deref());
    let config = match config::load_or_init(&path)? {
        ConfigLoad::Loaded(config) => config,
        ConfigLoad::Created(created) => {
            eprintln!("Created default config at {}", created.display());
            eprintln!("Fill in admin_email and admin_password, then run again.");
            return Ok(1);
        }
    };

    init_tracing(args.verbose, args.color, config.log_file.as_deref())?;
    cli::run(args, config).await
}

fn init_tracing(verbose: u8, color: cli::ColorArg, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = std::env::var("RUST_LOG").map_or_else(
        |_| {
            let level = if verbose > 0 { "debug" } else { "info" };
            EnvFilter::new(level)
        },
        EnvFilter::new,
    );

    let ansi = match color {
        cli::ColorArg::Always => true,
        cli::ColorArg::Never => false,
        cli::ColorArg::Auto => std::io::stderr().is_terminal(),
    };

    let stderr_layer = fmt::layer().with_ansi(ansi).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        registry
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        registry.init();
    }
    Ok(())
}
