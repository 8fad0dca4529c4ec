//! VSD CLI: compile design graphs into Zephyr boards and drive the
//! build/simulate toolchain.

mod backend;
mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vsd_codegen::GenerationError;
use vsd_graph::ValidationError;
use vsd_pipeline::{OrchestrationError, Stage};
use vsd_spec::SpecCompositionError;

use config::VsdConfig;

#[derive(Parser)]
#[command(name = "vsd", version, about = "Visual System Designer")]
struct Cli {
    /// Workspace directory (default: $VSD_WORKSPACE, then the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    /// Log level filter (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the Zephyr board directory for a design graph
    PrepareZephyrBoard {
        /// Graph file exported by the editor
        graph: PathBuf,
        /// Specification modification, applied in the order given
        #[arg(long = "spec-mod")]
        spec_mods: Vec<PathBuf>,
    },
    /// Build the application for a prepared board
    BuildZephyr {
        board: String,
        /// Application directory (default: generated/<board>)
        #[arg(long)]
        app_path: Option<PathBuf>,
    },
    /// Generate the simulator script and platform description for a built board
    PrepareRenodeFiles {
        board: String,
        /// Directory holding a custom run.resc
        #[arg(long)]
        templates_dir: Option<PathBuf>,
    },
    /// Run the simulation of a built board
    Simulate {
        board: String,
        /// Stop the simulation after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Prepare the board, generate the application and build it
    PrepareZephyrApp {
        graph: PathBuf,
        /// Application directory to build (and to generate into with --from-template)
        source_dir: PathBuf,
        /// Instantiate this application template into source_dir
        #[arg(long)]
        from_template: Option<PathBuf>,
        /// Replace source_dir if it exists
        #[arg(long)]
        force: bool,
        #[arg(long = "spec-mod")]
        spec_mods: Vec<PathBuf>,
    },
    /// Start the diagram editor server and serve its builds and simulations
    Run {
        /// Application sources built for the edited graph
        #[arg(long, conflicts_with = "app_template")]
        app: Option<PathBuf>,
        /// Application template instantiated for the edited graph
        /// (default: demo/templates/blinky-temperature)
        #[arg(long)]
        app_template: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 9000)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        backend_host: String,
        #[arg(long, default_value_t = 5000)]
        backend_port: u16,
        #[arg(long = "spec-mod")]
        spec_mods: Vec<PathBuf>,
    },
    /// Check a graph against the specification and list every problem
    Validate {
        graph: PathBuf,
        #[arg(long = "spec-mod")]
        spec_mods: Vec<PathBuf>,
    },
    /// Apply modifications to the specification file in place
    ModifySpec {
        /// Specification to modify (default: the workspace catalog)
        #[arg(short, long)]
        spec: Option<PathBuf>,
        #[arg(long = "spec-mod", required = true)]
        spec_mods: Vec<PathBuf>,
    },
    /// Show workspace configuration and tool availability
    Info,
    /// Remove a board's generated, build and output directories
    Clean { board: String },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.verbosity);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(exit_code(&e));
    }
}

fn init_tracing(verbosity: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(verbosity))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = VsdConfig::resolve(cli.workspace.as_deref())?;
    tracing::debug!(workspace = %config.workspace.root().display(), "configuration resolved");

    match cli.command {
        Commands::PrepareZephyrBoard { graph, spec_mods } => {
            commands::board::run(&config, &graph, &spec_mods)
        }
        Commands::BuildZephyr { board, app_path } => {
            commands::build::run(&config, &board, app_path.as_deref())
        }
        Commands::PrepareRenodeFiles { board, templates_dir } => {
            commands::renode::run(&config, &board, templates_dir.as_deref())
        }
        Commands::Simulate { board, timeout } => commands::simulate::run(&config, &board, timeout),
        Commands::PrepareZephyrApp {
            graph,
            source_dir,
            from_template,
            force,
            spec_mods,
        } => commands::app::run(
            &config,
            &graph,
            &source_dir,
            from_template.as_deref(),
            force,
            &spec_mods,
        ),
        Commands::Run {
            app,
            app_template,
            host,
            port,
            backend_host,
            backend_port,
            spec_mods,
        } => commands::editor::run(
            &config,
            &commands::editor::EditorOptions {
                application: match app {
                    Some(dir) => backend::Application::Sources(dir),
                    None => backend::Application::Template(
                        app_template.unwrap_or_else(|| PathBuf::from(commands::editor::DEFAULT_TEMPLATE)),
                    ),
                },
                host,
                port,
                backend_host,
                backend_port,
                spec_mods,
            },
        ),
        Commands::Validate { graph, spec_mods } => commands::validate::run(&config, &graph, &spec_mods),
        Commands::ModifySpec { spec, spec_mods } => {
            let spec = spec.unwrap_or_else(|| config.catalog_path());
            commands::modify_spec::run(&spec, &spec_mods)
        }
        Commands::Info => commands::info::run(&config),
        Commands::Clean { board } => commands::clean::run(&config, &board),
    }
}

/// Process exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<OrchestrationError>() {
            if e.is_contention() {
                return 6;
            }
            return e.stage().map_or(1, stage_exit_code);
        }
        if cause.is::<SpecCompositionError>() || cause.is::<ValidationError>() {
            return 65;
        }
        if cause.is::<GenerationError>() {
            return stage_exit_code(Stage::PrepareBoard);
        }
    }
    1
}

fn stage_exit_code(stage: Stage) -> i32 {
    match stage {
        Stage::PrepareBoard => 2,
        Stage::Build => 3,
        Stage::PrepareSimulatorFiles => 4,
        Stage::Simulate => 5,
    }
}
