//! sqldelta CLI
//!
//! Command-line tool for diffing schemas and applying the result.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sqldelta::prelude::*;

/// Schema diffing and migration planning for SQL databases.
#[derive(Parser)]
#[command(name = "sqldelta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Postgres,
    Sqlite,
}

/// Options shared by every command that runs the autodetector.
#[derive(clap::Args)]
struct DiffOptions {
    /// Fail instead of guessing when a rename has several candidates.
    #[arg(long)]
    strict: bool,

    /// Emit foreign key renames when a table or column rename changes them.
    #[arg(long)]
    rename_foreign_keys: bool,
}

impl DiffOptions {
    fn autodetector_options(&self) -> AutodetectorOptions {
        let mut options = AutodetectorOptions::new();
        if self.strict {
            options = options.with_strict_renames();
        }
        if self.rename_foreign_keys {
            options = options.with_renamed_fks();
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the script that turns one schema file into another.
    Diff {
        /// Schema the database has now (JSON).
        #[arg(short, long)]
        current: PathBuf,

        /// Schema the database should have (JSON).
        #[arg(short, long)]
        target: PathBuf,

        /// SQL dialect to render.
        #[arg(long, value_enum, default_value = "postgres")]
        dialect: DialectArg,

        /// Print the reverse (down) script instead.
        #[arg(long)]
        down: bool,

        #[command(flatten)]
        options: DiffOptions,
    },

    /// Print the live database schema as JSON.
    Inspect,

    /// Show the script that brings the live database to a target schema.
    Plan {
        /// Schema the database should have (JSON).
        #[arg(short, long)]
        target: PathBuf,

        /// Print the reverse (down) script instead.
        #[arg(long)]
        down: bool,

        #[command(flatten)]
        options: DiffOptions,
    },

    /// Bring the live database to a target schema.
    Apply {
        /// Schema the database should have (JSON).
        #[arg(short, long)]
        target: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        options: DiffOptions,
    },
}

/// Diffs, orders and renders a changeset as a script with a header.
fn render_plan<D: MigrationDialect + Copy>(
    dialect: D,
    current: &Schema,
    target: &Schema,
    options: AutodetectorOptions,
    down: bool,
) -> anyhow::Result<String> {
    let mut changeset = Autodetector::with_options(options)
        .with_types(dialect)
        .diff(current, target)?
        .resolve()?;
    if down {
        changeset = changeset.reverse();
    }

    let header = format!(
        "-- Generated by sqldelta {} on {}\n-- Dialect: {}, {} operation(s)",
        env!("CARGO_PKG_VERSION"),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
        dialect.name(),
        changeset.len()
    );
    Ok(format!("{header}\n\n{}", changeset.to_script(&dialect)))
}

async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database)
        .await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so scripts and JSON can be piped.
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diff {
            current,
            target,
            dialect,
            down,
            options,
        } => {
            let current = Schema::from_json_file(&current)?;
            let target = Schema::from_json_file(&target)?;
            let options = options.autodetector_options();
            let script = match dialect {
                DialectArg::Postgres => {
                    render_plan(PostgresDialect::new(), &current, &target, options, down)?
                }
                DialectArg::Sqlite => {
                    render_plan(SqliteDialect::new(), &current, &target, options, down)?
                }
            };
            println!("{script}");
        }

        Commands::Inspect => {
            let pool = connect(&cli.database).await?;
            let schema = SqliteInspector::new(pool).inspect().await?;
            println!("{}", schema.to_json_string()?);
        }

        Commands::Plan {
            target,
            down,
            options,
        } => {
            let target = Schema::from_json_file(&target)?;
            let pool = connect(&cli.database).await?;
            let current = SqliteInspector::new(pool).inspect().await?;
            let options = options.autodetector_options();
            println!(
                "{}",
                render_plan(SqliteDialect::new(), &current, &target, options, down)?
            );
        }

        Commands::Apply {
            target,
            dry_run,
            options,
        } => {
            let target = Schema::from_json_file(&target)?;
            let pool = connect(&cli.database).await?;
            let current = SqliteInspector::new(pool.clone()).inspect().await?;

            let dialect = SqliteDialect::new();
            let changeset = Autodetector::with_options(options.autodetector_options())
                .with_types(dialect)
                .diff(&current, &target)?
                .resolve()?;

            if changeset.is_empty() {
                info!("Database already matches the target schema.");
                return Ok(());
            }
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let executor = MigrationExecutor::new(pool, dialect).dry_run(dry_run);
            let executed = executor.apply(&changeset).await?;
            if !dry_run {
                info!("Applied {executed} statement(s).");
            }
        }
    }

    Ok(())
}
