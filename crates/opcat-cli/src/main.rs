//! Opcat CLI - build, maintain, serve and export operator catalogs

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

mod commands;
mod error;
mod exit_codes;

use error::Result;

#[derive(Parser)]
#[command(name = "opcat")]
#[command(author = "Opcat Contributors")]
#[command(version)]
#[command(about = "The operator catalog registry", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path of the catalog store file
    #[arg(short = 'd', long, global = true, default_value = "index.db", env = "OPCAT_DATABASE")]
    database: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add bundles to the catalog
    Add {
        /// Bundle directories (or references the fetcher understands)
        #[arg(required = true)]
        bundles: Vec<String>,

        /// Update mode: replaces, semver or semver-skippatch
        #[arg(long, default_value = "replaces")]
        mode: String,

        /// Downgrade graph warnings to log lines
        #[arg(long)]
        permissive: bool,

        /// Allow overwriting a channel head with a same-named bundle
        #[arg(long)]
        overwrite_latest: bool,

        /// Optional validators to enable (removed-apis, multiarch, operatorhub)
        #[arg(long = "enable-validator")]
        validators: Vec<String>,

        /// Validator options as key=value (k8s-version, container-tools, index-path)
        #[arg(long = "validator-opt")]
        validator_opts: Vec<String>,
    },

    /// Remove packages from the catalog
    Rm {
        /// Package names to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Remove every package not in the keep set
    Prune {
        /// Packages to keep
        #[arg(short, long = "packages", required = true)]
        packages: Vec<String>,
    },

    /// Remove bundles no channel head can reach
    PruneStranded,

    /// Deprecate bundles, truncating what they transitively replace
    Deprecate {
        /// Bundle names to deprecate
        #[arg(required = true)]
        bundles: Vec<String>,

        /// Allow the deprecation to cascade a whole package away
        #[arg(long)]
        allow_package_removal: bool,
    },

    /// Serve the catalog query service
    Serve {
        /// Port for the liveness endpoint
        #[arg(short, long, default_value_t = 50051)]
        port: u16,
    },

    /// Validate a bundle directory or a file-based catalog
    Validate {
        /// Bundle directory or catalog path
        path: PathBuf,

        /// Optional validators to enable
        #[arg(long = "enable-validator")]
        validators: Vec<String>,

        /// Validator options as key=value
        #[arg(long = "validator-opt")]
        validator_opts: Vec<String>,
    },

    /// Render the store into the file-based catalog form
    Render {
        /// Output directory (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: json or yaml
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Run schema migrations
    Migrate {
        /// Migrate down to this id instead of up to the latest
        #[arg(long)]
        down_to: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(&cli) {
        let code = e.exit_code();
        eprintln!("{} {:?}", style("error:").red().bold(), miette::Report::new(e));
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Add {
            bundles,
            mode,
            permissive,
            overwrite_latest,
            validators,
            validator_opts,
        } => commands::add::run(
            &cli.database,
            bundles,
            mode,
            *permissive,
            *overwrite_latest,
            validators,
            validator_opts,
        ),

        Commands::Rm { packages } => commands::rm::run(&cli.database, packages),

        Commands::Prune { packages } => commands::prune::run(&cli.database, packages),

        Commands::PruneStranded => commands::prune_stranded::run(&cli.database),

        Commands::Deprecate {
            bundles,
            allow_package_removal,
        } => commands::deprecate::run(&cli.database, bundles, *allow_package_removal),

        Commands::Serve { port } => commands::serve::run(&cli.database, *port),

        Commands::Validate {
            path,
            validators,
            validator_opts,
        } => commands::validate::run(path, validators, validator_opts),

        Commands::Render { output, format } => {
            commands::render::run(&cli.database, output.as_deref(), format)
        }

        Commands::Migrate { down_to } => commands::migrate::run(&cli.database, *down_to),
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
