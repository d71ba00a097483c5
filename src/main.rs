//! recipe-assets - maintenance CLI for recipe image assets.
//!
//! Runs the image migration and slug reconciliation passes against an image
//! root, and manages uploaded migration archives.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipe_assets::archives::{self, MigrationKind};
use recipe_assets::{AssetMigrator, CollisionPolicy, MigrationConfig, SqliteRecipeSource};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "recipe-assets")]
#[command(about = "Migrate, minify and reconcile recipe image assets")]
struct Cli {
    /// JSON configuration file (missing keys use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root image directory (overrides the config file)
    #[arg(long, global = true)]
    image_dir: Option<PathBuf>,

    /// Directory holding uploaded migration archives
    #[arg(long, global = true)]
    migration_dir: Option<PathBuf>,

    /// What to do when a slug rename hits an existing directory: skip-and-warn, fail, merge
    #[arg(long, global = true)]
    collision: Option<CollisionPolicy>,

    /// Print the run report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move loose images into per-recipe directories and derive variants
    Migrate {
        /// Number of directories to process at once
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Rename image directories to match recipe slugs
    Reconcile {
        /// Recipe database (opened read-only)
        #[arg(long)]
        database: PathBuf,
    },
    /// Manage uploaded migration archives
    Archives {
        #[command(subcommand)]
        action: ArchiveAction,
    },
}

#[derive(Subcommand, Debug)]
enum ArchiveAction {
    /// List available archives per migration type, newest first
    List,
    /// Delete an archive or extracted directory
    Delete { kind: MigrationKind, name: String },
    /// Copy an archive into the migration directory
    Upload {
        kind: MigrationKind,
        file: PathBuf,
        /// Stored file name (defaults to the source file name)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = build_config(&cli)?;

    match &cli.command {
        Command::Migrate { jobs } => {
            let config = MigrationConfig {
                jobs: jobs.unwrap_or(config.jobs),
                ..config
            };
            let migrator = AssetMigrator::new(config)?;
            info!("Image root: {}", migrator.config().image_dir.display());

            let report = if migrator.config().jobs > 1 {
                migrator.migrate_images_concurrent().await?
            } else {
                migrator.migrate_images()?
            };

            warn_on_failures(report.failure_count());
            print_report(&cli, &report)?;
        }
        Command::Reconcile { database } => {
            let migrator = AssetMigrator::new(config)?;
            let source = SqliteRecipeSource::open(database)?;
            info!("Recipe database: {}", source.path().display());

            let report = migrator.reconcile_slugs(&source)?;

            warn_on_failures(report.failure_count());
            print_report(&cli, &report)?;
        }
        Command::Archives { action } => run_archives(&cli, &config, action)?,
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<MigrationConfig> {
    let mut config = match &cli.config {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MigrationConfig::default(),
    };

    if let Some(dir) = &cli.image_dir {
        config.image_dir = dir.clone();
    }
    if let Some(dir) = &cli.migration_dir {
        config.migration_dir = dir.clone();
    }
    if let Some(policy) = cli.collision {
        config.collision_policy = policy;
    }

    Ok(config)
}

fn run_archives(cli: &Cli, config: &MigrationConfig, action: &ArchiveAction) -> Result<()> {
    let migration_dir = &config.migration_dir;
    match action {
        ArchiveAction::List => {
            let options = archives::list_migration_options(migration_dir)?;
            if cli.json {
                print_report(cli, &options)?;
            } else {
                for option in &options {
                    println!("{}:", option.kind);
                    for file in &option.files {
                        println!("  {}  {}", file.date.format("%Y-%m-%d %H:%M:%S"), file.name);
                    }
                }
            }
        }
        ArchiveAction::Delete { kind, name } => {
            archives::delete_migration_data(migration_dir, *kind, name)?;
        }
        ArchiveAction::Upload { kind, file, name } => {
            let name = match name {
                Some(name) => name.clone(),
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("upload path has no file name")?,
            };
            let mut reader =
                File::open(file).with_context(|| format!("opening {}", file.display()))?;
            archives::store_upload(migration_dir, *kind, &name, &mut reader)?;
        }
    }
    Ok(())
}

fn warn_on_failures(count: usize) {
    if count > 0 {
        warn!("{} item(s) failed; see the log above for details", count);
    }
}

fn print_report<T: Serialize>(cli: &Cli, report: &T) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}
