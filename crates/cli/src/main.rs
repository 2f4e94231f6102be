mod commands;
mod report;

use clap::{Parser, Subcommand};
use commands::*;

#[derive(Parser)]
#[command(name = "shiftlog")]
#[command(version)]
#[command(about = "Apply versioned SQL migrations to a database, in order and exactly once")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Show the resolved configuration and where each value came from
    Config {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply every pending migration
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Plan only; report what would run without touching the schema
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List migrations and whether each one has been applied
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the status listing as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", console::style("error:").red().bold(), e);
            1
        }
    };

    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Run {
                target,
                dry_run,
                json,
            } => migrate::run(&target, dry_run, json).await,
            MigrateCommands::Status { target, json } => migrate::status(&target, json).await,
        },
        Commands::Config { target } => config::show(&target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_run_flags() {
        let cli = Cli::try_parse_from([
            "shiftlog",
            "migrate",
            "run",
            "--dir",
            "db/migrations",
            "--database-url",
            "sqlite://app.db",
            "--table",
            "ledger",
            "--dry-run",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Migrate {
                migrate_command:
                    MigrateCommands::Run {
                        target,
                        dry_run,
                        json,
                    },
            } => {
                assert_eq!(target.dir.as_deref(), Some(std::path::Path::new("db/migrations")));
                assert_eq!(target.database_url.as_deref(), Some("sqlite://app.db"));
                assert_eq!(target.table.as_deref(), Some("ledger"));
                assert!(dry_run);
                assert!(json);
            }
            _ => panic!("expected migrate run"),
        }
    }

    #[test]
    fn test_parse_status_defaults() {
        let cli = Cli::try_parse_from(["shiftlog", "migrate", "status"]).unwrap();
        match cli.command {
            Commands::Migrate {
                migrate_command: MigrateCommands::Status { target, json },
            } => {
                assert!(target.dir.is_none());
                assert!(target.database_url.is_none());
                assert!(!json);
            }
            _ => panic!("expected migrate status"),
        }
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["shiftlog", "migrate", "rollback"]).is_err());
        assert!(Cli::try_parse_from(["shiftlog"]).is_err());
    }
}
