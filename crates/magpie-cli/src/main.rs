mod classify_cmd;
mod config;
mod convert_cmd;
mod job_cmds;
mod registry_cmds;
mod run_cmd;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

use magpie_store::models::JobPriority;

use classify_cmd::OutputFormat;

#[derive(Parser)]
#[command(name = "magpie", about = "OpenAPI-to-UI-pattern toolkit and workflow runner")]
struct Cli {
    /// Data directory (overrides MAGPIE_DATA_DIR env var)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a magpie config file
    Init {
        /// Data directory to record in the config
        #[arg(long)]
        data_dir: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Classify the endpoints of an OpenAPI document into UI patterns
    Classify {
        /// Path to the OpenAPI document (YAML or JSON)
        spec: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Fail on the first endpoint that cannot be described
        #[arg(long)]
        strict: bool,
    },
    /// Convert a YAML file to JSON
    Convert {
        /// Input YAML file
        input: PathBuf,
        /// Output JSON file (stdout if not specified)
        output: Option<PathBuf>,
        /// Emit compact JSON
        #[arg(long)]
        compact: bool,
    },
    /// Script registry management
    Registry {
        /// Registry file (defaults to <data-dir>/registry.json)
        #[arg(long)]
        registry: Option<PathBuf>,
        #[command(subcommand)]
        command: RegistryCommands,
    },
    /// Execute a workflow in-process
    Run {
        /// Path to the workflow YAML file
        workflow: PathBuf,
        /// Initial variables as key=value (value parsed as JSON when possible)
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Background job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum RegistryCommands {
    /// Validate script metadata
    Validate {
        /// Registry file to validate (defaults to the configured registry)
        file: Option<PathBuf>,
        /// Apply mechanical fixes before validating
        #[arg(long)]
        fix: bool,
        /// Where to write the fixed registry (defaults to the input file)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show one script's metadata
    Show {
        /// Script id (category/name)
        id: String,
    },
    /// List scripts
    List {
        /// Only scripts assigned to this specialist
        #[arg(long)]
        specialist: Option<String>,
    },
    /// Show registry cache statistics
    Stats,
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Queue a workflow for background execution
    Submit {
        /// Path to the workflow YAML file
        workflow: PathBuf,
        /// Job priority: high, normal, low
        #[arg(long, default_value = "normal")]
        priority: JobPriority,
        /// Retries after the first failed attempt
        #[arg(long, default_value_t = 3)]
        retry_max: u32,
        /// Job arguments as key=value (value parsed as JSON when possible)
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Run a worker pool until interrupted
    Worker {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Show one job
    Status {
        /// Job id
        id: Uuid,
    },
    /// Cancel a pending job
    Cancel {
        /// Job id
        id: Uuid,
    },
    /// List all jobs
    List,
    /// Delete finished jobs older than a cutoff
    Cleanup {
        /// Age cutoff in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

/// Execute the `magpie init` command: write the config file.
fn cmd_init(data_dir: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let dir = data_dir
        .map(PathBuf::from)
        .unwrap_or_else(magpie_store::config::StoreConfig::default_data_dir);
    let cfg = config::ConfigFile {
        data: config::DataSection {
            dir: dir.display().to_string(),
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  data.dir = {}", dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = config::resolve_store(cli.data_dir.as_deref());

    match cli.command {
        Commands::Init { data_dir, force } => {
            cmd_init(data_dir.as_deref(), force)?;
        }
        Commands::Classify {
            spec,
            format,
            strict,
        } => {
            classify_cmd::run(&spec, format, strict)?;
        }
        Commands::Convert {
            input,
            output,
            compact,
        } => {
            convert_cmd::run(&input, output.as_deref(), compact)?;
        }
        Commands::Registry { registry, command } => {
            let registry_path =
                registry.unwrap_or_else(|| config::default_registry_path(&store));
            match command {
                RegistryCommands::Validate { file, fix, output } => {
                    let file = file.unwrap_or_else(|| registry_path.clone());
                    registry_cmds::validate(&file, fix, output.as_deref())?;
                }
                RegistryCommands::Show { id } => registry_cmds::show(&registry_path, &id)?,
                RegistryCommands::List { specialist } => {
                    registry_cmds::list(&registry_path, specialist.as_deref())?;
                }
                RegistryCommands::Stats => registry_cmds::stats(&registry_path)?,
            }
        }
        Commands::Run { workflow, vars } => {
            run_cmd::run(&store, &workflow, &vars).await?;
        }
        Commands::Job { command } => match command {
            JobCommands::Submit {
                workflow,
                priority,
                retry_max,
                vars,
            } => {
                job_cmds::submit(&store, &workflow, priority, retry_max, &vars)?;
            }
            JobCommands::Worker { workers } => {
                job_cmds::worker(&store, workers).await?;
            }
            JobCommands::Status { id } => job_cmds::status(&store, id)?,
            JobCommands::Cancel { id } => job_cmds::cancel(&store, id)?,
            JobCommands::List => job_cmds::list(&store)?,
            JobCommands::Cleanup { hours } => job_cmds::cleanup(&store, hours)?,
        },
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
