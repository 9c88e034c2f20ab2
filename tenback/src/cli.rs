//! Command line interface and command dispatch.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use recbase::client::{ClientConfig, RecbaseClient};
use tracing::info;

use crate::{
    config::{BackupConfig, CONFIG_ENV},
    orchestrator,
    remote::RemoteSync,
    restore,
};

/// Exit code for a run that completed but recorded errors.
pub const EXIT_COMPLETED_WITH_ERRORS: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tenback")]
#[command(author, version, about = "Per-tenant backup and restore for a multi-tenant record store", long_about = None)]
pub struct Cli {
    /// Config file path. Default: environment `TENBACK_CONFIG` or /etc/tenback/config.json
    #[arg(short = 'c', long, env = CONFIG_ENV, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose mode (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Color mode for CLI and log output
    #[arg(long, value_enum, default_value_t = ColorArg::Auto, global = true)]
    pub color: ColorArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full backup of every tenant
    Backup,

    /// List the newest archives per remote folder
    List,

    /// Restore records from a backup archive
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    #[command(subcommand)]
    pub command: RestoreCommands,
}

#[derive(Subcommand, Debug)]
pub enum RestoreCommands {
    /// Restore each tenant's latest remote archive
    Latest {
        /// Only tenants whose folder name contains this text
        #[arg(long)]
        tenant: Option<String>,

        /// Report what would change without writing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore from a local archive file
    File {
        /// Path to a backup zip
        path: PathBuf,

        /// Report what would change without writing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-upload the latest full-database snapshot to the server
    FullDb {
        /// Show which snapshot would be used and stop
        #[arg(long)]
        dry_run: bool,
    },
}

fn build_client(config: &BackupConfig) -> Result<RecbaseClient> {
    let client = RecbaseClient::with_config(ClientConfig {
        base_url: config.base_url.trim_end_matches('/').to_string(),
        admin_email: config.admin_email.clone(),
        admin_password: config.admin_password.clone(),
        ..ClientConfig::default()
    })?;
    Ok(client)
}

fn build_sync(config: &BackupConfig) -> RemoteSync {
    RemoteSync::new(
        &config.rclone_remote,
        &config.remote_root,
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
    )
}

async fn authed_client(config: &BackupConfig) -> Result<RecbaseClient> {
    config.require_credentials()?;
    let client = build_client(config)?;
    client.login().await.context("admin login")?;
    info!(url = %config.base_url, "logged in");
    Ok(client)
}

/// Dispatches one parsed command. Returns the process exit code: 0 for a
/// clean run, [`EXIT_COMPLETED_WITH_ERRORS`] when the run finished but
/// recorded errors. Fatal preconditions surface as `Err` (exit code 1).
pub async fn run(cli: Cli, config: BackupConfig) -> Result<u8> {
    match &cli.command {
        Commands::Backup => {
            let client = authed_client(&config).await?;
            let sync = build_sync(&config);
            sync.check_remote().await?;
            let summary = orchestrator::run_backup(&client, &config, &sync).await?;
            Ok(if summary.has_errors() {
                EXIT_COMPLETED_WITH_ERRORS
            } else {
                0
            })
        }
        Commands::List => {
            let sync = build_sync(&config);
            sync.check_remote().await?;
            restore::list_backups(&sync).await?;
            Ok(0)
        }
        Commands::Restore(args) => match &args.command {
            RestoreCommands::Latest { tenant, dry_run } => {
                let client = authed_client(&config).await?;
                let sync = build_sync(&config);
                sync.check_remote().await?;
                let totals =
                    restore::restore_latest(&client, &sync, tenant.as_deref(), *dry_run).await?;
                println!("{}", totals.render());
                Ok(if totals.errors > 0 {
                    EXIT_COMPLETED_WITH_ERRORS
                } else {
                    0
                })
            }
            RestoreCommands::File { path, dry_run } => {
                let client = authed_client(&config).await?;
                let totals = restore::restore_from_archive(&client, path, *dry_run).await?;
                println!("{}", totals.render());
                Ok(if totals.errors > 0 {
                    EXIT_COMPLETED_WITH_ERRORS
                } else {
                    0
                })
            }
            RestoreCommands::FullDb { dry_run } => {
                let client = authed_client(&config).await?;
                let sync = build_sync(&config);
                sync.check_remote().await?;
                restore::restore_full_db(&client, &sync, *dry_run).await?;
                Ok(0)
            }
        },
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backup() {
        let cli = Cli::try_parse_from(["tenback", "backup"]).unwrap();
        assert!(matches!(cli.command, Commands::Backup));
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.color, ColorArg::Auto);
    }

    #[test]
    fn parses_restore_latest_with_filter() {
        let cli = Cli::try_parse_from([
            "tenback", "restore", "latest", "--tenant", "Toko", "--dry-run",
        ])
        .unwrap();
        let Commands::Restore(args) = cli.command else {
            panic!("expected restore");
        };
        let RestoreCommands::Latest { tenant, dry_run } = args.command else {
            panic!("expected latest");
        };
        assert_eq!(tenant.as_deref(), Some("Toko"));
        assert!(dry_run);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["tenback", "backup", "-vv", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.json")));
    }

    #[test]
    fn restore_file_requires_path() {
        assert!(Cli::try_parse_from(["tenback", "restore", "file"]).is_err());
    }
}
