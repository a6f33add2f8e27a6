//! The `quarry` command line.
//!
//! Applications with their own migrations embed the CLI by passing their
//! registry to [`run`]:
//!
//! ```rust,no_run
//! use quarry_migrate::{cli, MigrationRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     cli::run(MigrationRegistry::new()).await
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quarry_core::{ConnectionConfig, DatabaseConfig, DatabaseManager};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::creator::{MigrationCreator, Stub};
use crate::error::Result;
use crate::migration::MigrationRegistry;
use crate::migrator::Migrator;
use crate::repository::{MigrationRepository, DEFAULT_TABLE};

/// Connection used when no configuration file exists.
pub const FALLBACK_CONNECTION: &str = "sqlite";

/// Batch-tracked schema migrations.
#[derive(Debug, Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, env = "QUARRY_CONFIG", default_value = "quarry.toml")]
    pub config: PathBuf,

    /// Connection to use (the configured default when omitted).
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Migrations directory.
    #[arg(short, long, global = true, default_value = "migrations")]
    pub path: PathBuf,

    /// Application environment; destructive commands need `--force` in
    /// production.
    #[arg(long, global = true, env = "QUARRY_ENV", default_value = "local")]
    pub env: String,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the migration repository table.
    #[command(name = "migrations:install")]
    Install,

    /// Run pending migrations.
    #[command(name = "migrations:run")]
    Run {
        /// Print the SQL instead of running it.
        #[arg(long)]
        pretend: bool,

        /// Run in production.
        #[arg(long)]
        force: bool,
    },

    /// Roll back the last batch.
    #[command(name = "migrations:rollback")]
    Rollback {
        /// Print the SQL instead of running it.
        #[arg(long)]
        pretend: bool,

        /// Run in production.
        #[arg(long)]
        force: bool,
    },

    /// Roll back every migration.
    #[command(name = "migrations:reset")]
    Reset {
        /// Print the SQL instead of running it.
        #[arg(long)]
        pretend: bool,

        /// Run in production.
        #[arg(long)]
        force: bool,
    },

    /// Roll back every migration, then run them all.
    #[command(name = "migrations:refresh")]
    Refresh {
        /// Run in production.
        #[arg(long)]
        force: bool,
    },

    /// Show which migrations ran.
    #[command(name = "migrations:status")]
    Status,

    /// Create a migration file.
    #[command(name = "make:migration")]
    MakeMigration {
        /// Snake-case migration name, e.g. `create_users_table`.
        name: String,

        /// Table the migration alters.
        #[arg(long)]
        table: Option<String>,

        /// Table the migration creates.
        #[arg(long)]
        create: Option<String>,
    },
}

impl Commands {
    fn force(&self) -> Option<bool> {
        match self {
            Self::Run { force, .. }
            | Self::Rollback { force, .. }
            | Self::Reset { force, .. }
            | Self::Refresh { force } => Some(*force),
            _ => None,
        }
    }
}

/// Loads the database configuration from `path`. A missing file yields a
/// single SQLite connection to `database.sqlite`.
///
/// # Errors
///
/// Returns IO and TOML parse failures.
pub fn load_config(path: &Path) -> Result<DatabaseConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No configuration file, using SQLite");
        return Ok(DatabaseConfig::single(
            FALLBACK_CONNECTION,
            ConnectionConfig::sqlite("database.sqlite"),
        ));
    }
    let source = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&source)?)
}

/// Runs `cli` and returns the lines to print.
///
/// # Errors
///
/// Returns the failing command's error.
pub async fn dispatch(
    cli: &Cli,
    registry: MigrationRegistry,
    manager: Arc<DatabaseManager>,
) -> Result<Vec<String>> {
    if cli.command.force() == Some(false) && cli.env == "production" {
        return Ok(vec![String::from(
            "Application in production: use --force to run this command.",
        )]);
    }

    if let Commands::MakeMigration {
        name,
        table,
        create,
    } = &cli.command
    {
        let stub = Stub::from_options(table.as_deref(), create.as_deref());
        let file = MigrationCreator::new(&cli.path).create(name, &stub)?;
        return Ok(vec![format!("Created migration: {}", file.display())]);
    }

    let repository = MigrationRepository::new(Arc::clone(&manager), DEFAULT_TABLE);
    let mut migrator = Migrator::new(repository, registry, manager);
    migrator.set_connection(cli.database.clone());

    let lines = match &cli.command {
        Commands::Install => {
            if migrator.repository_exists().await? {
                vec![String::from("Migration table already exists.")]
            } else {
                migrator.repository().create_repository().await?;
                vec![String::from("Migration table created successfully.")]
            }
        }
        Commands::Run { pretend, .. } => {
            install(&migrator).await?;
            migrator.run(&cli.path, *pretend).await?;
            migrator.notes().to_vec()
        }
        Commands::Rollback { pretend, .. } => {
            migrator.rollback(*pretend).await?;
            migrator.notes().to_vec()
        }
        Commands::Reset { pretend, .. } => {
            migrator.reset(*pretend).await?;
            migrator.notes().to_vec()
        }
        Commands::Refresh { .. } => {
            install(&migrator).await?;
            migrator.refresh(&cli.path, false).await?;
            migrator.notes().to_vec()
        }
        Commands::Status => {
            if !migrator.repository_exists().await? {
                return Ok(vec![String::from("No migrations found.")]);
            }
            migrator
                .status(&cli.path)
                .await?
                .into_iter()
                .map(|status| {
                    let mark = if status.ran { "Y" } else { "N" };
                    format!("[{mark}] {}", status.migration)
                })
                .collect()
        }
        Commands::MakeMigration { .. } => Vec::new(),
    };
    Ok(lines)
}

async fn install(migrator: &Migrator) -> Result<()> {
    if !migrator.repository_exists().await? {
        migrator.repository().create_repository().await?;
    }
    Ok(())
}

/// Parses the process arguments, runs the command against the configured
/// databases and prints its output.
///
/// # Errors
///
/// Returns configuration, connection and migration failures.
pub async fn run(registry: MigrationRegistry) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;
    let manager = Arc::new(quarry_sqlx::manager(config));
    let lines = dispatch(&cli, registry, Arc::clone(&manager)).await;
    manager.disconnect(cli.database.as_deref()).await;

    for line in lines? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "quarry",
            "migrations:rollback",
            "--pretend",
            "--database",
            "pgsql",
        ])
        .unwrap();
        assert_eq!(cli.database.as_deref(), Some("pgsql"));
        assert_eq!(cli.path, PathBuf::from("migrations"));
        assert!(matches!(
            cli.command,
            Commands::Rollback {
                pretend: true,
                force: false
            }
        ));

        let cli = Cli::try_parse_from([
            "quarry",
            "make:migration",
            "create_users_table",
            "--create",
            "users",
        ])
        .unwrap();
        match cli.command {
            Commands::MakeMigration {
                name,
                table,
                create,
            } => {
                assert_eq!(name, "create_users_table");
                assert_eq!(table, None);
                assert_eq!(create.as_deref(), Some("users"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(Cli::try_parse_from(["quarry", "migrate"]).is_err());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config(&dir.path().join("quarry.toml")).unwrap();
        assert_eq!(missing.default, FALLBACK_CONNECTION);

        let path = dir.path().join("quarry.toml");
        std::fs::write(
            &path,
            "default = \"main\"\n\n[connections.main]\ndriver = \"sqlite\"\ndatabase = \":memory:\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.default, "main");
        assert_eq!(config.connection("main").unwrap().database, ":memory:");
    }
}
