//! etl-planner CLI - plan parallel PostgreSQL schema copies and attribute tables.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use etl_planner::{
    AttributesTablePlanner, CatalogIntrospector, CatalogSnapshot, Config, Plan, PlanError,
    SchemaCopyPlanner, TaskLayout,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "etl-planner")]
#[command(about = "Plan parallel PostgreSQL schema copies and attribute tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan copying a schema from one database to another
    PlanSchemaCopy {
        /// Schema to copy
        #[arg(long)]
        schema: String,

        /// Source database alias
        #[arg(long)]
        source: String,

        /// Target database alias
        #[arg(long)]
        target: String,

        /// Maximum number of parallel tasks (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Plan against a catalog snapshot instead of the live source
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Append the copy to the end of an existing plan (JSON)
        #[arg(long)]
        append_to: Option<PathBuf>,

        /// Write the plan to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plan an attributes lookup table for a table
    PlanAttributes {
        /// Schema of the source table
        #[arg(long)]
        schema: String,

        /// Source table
        #[arg(long)]
        table: String,

        /// Database alias (default: planning.default_database)
        #[arg(long)]
        database: Option<String>,

        /// Attributes table suffix (overrides config)
        #[arg(long)]
        suffix: Option<String>,

        /// Task layout (overrides config)
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Maximum number of parallel tasks (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Plan against a catalog snapshot instead of the live database
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Write the plan to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture a catalog snapshot of a schema
    Snapshot {
        /// Schema to capture
        #[arg(long)]
        schema: String,

        /// Database alias (default: planning.default_database)
        #[arg(long)]
        database: Option<String>,

        /// Snapshot file to write
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Chunked,
    PerColumn,
}

impl From<LayoutArg> for TaskLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Chunked => TaskLayout::Chunked,
            LayoutArg::PerColumn => TaskLayout::PerColumn,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), PlanError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::PlanSchemaCopy {
            schema,
            source,
            target,
            parallelism,
            snapshot,
            append_to,
            output,
        } => {
            let catalog = open_catalog(&config, snapshot.as_deref(), Some(&source))?;
            let planner = SchemaCopyPlanner::new(
                source,
                target,
                schema,
                parallelism.unwrap_or(config.planning.max_parallel_tasks),
            )?;
            let plan = match append_to {
                Some(path) => {
                    let pipeline = Plan::load(&path)?;
                    info!("Appending to plan {:?} ({} nodes)", path, pipeline.len());
                    planner.append_to(pipeline, catalog.as_ref()).await?
                }
                None => planner.plan(catalog.as_ref()).await?,
            };
            write_plan(&plan, output.as_deref())?;
        }

        Commands::PlanAttributes {
            schema,
            table,
            database,
            suffix,
            layout,
            parallelism,
            snapshot,
            output,
        } => {
            let alias = config
                .database_alias(database.as_deref())
                .ok_or_else(|| {
                    PlanError::Config(
                        "--database is required when planning.default_database is not set"
                            .to_string(),
                    )
                })?
                .to_string();
            let catalog = open_catalog(&config, snapshot.as_deref(), Some(&alias))?;
            let planner = AttributesTablePlanner::new(
                alias,
                schema,
                table,
                suffix.unwrap_or_else(|| config.planning.attributes_table_suffix.clone()),
                parallelism.unwrap_or(config.planning.max_parallel_tasks),
                layout.map(Into::into).unwrap_or(config.planning.attribute_layout),
            )?;
            let plan = planner.plan(catalog.as_ref()).await?;
            write_plan(&plan, output.as_deref())?;
        }

        Commands::Snapshot {
            schema,
            database,
            output,
        } => {
            let catalog = config.catalog(database.as_deref())?;
            let snapshot = catalog.snapshot(&schema).await?;
            snapshot.save(&output)?;
            info!("Wrote snapshot of '{}' to {:?}", schema, output);
        }
    }

    Ok(())
}

/// Snapshot file when given, live catalog of `alias` otherwise.
fn open_catalog(
    config: &Config,
    snapshot: Option<&Path>,
    alias: Option<&str>,
) -> Result<Box<dyn CatalogIntrospector>, PlanError> {
    match snapshot {
        Some(path) => {
            info!("Planning against snapshot {:?}", path);
            Ok(Box::new(CatalogSnapshot::load(path)?))
        }
        None => Ok(Box::new(config.catalog(alias)?)),
    }
}

fn write_plan(plan: &Plan, output: Option<&Path>) -> Result<(), PlanError> {
    let json = plan.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Wrote plan with {} tasks to {:?}", plan.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the plan
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
