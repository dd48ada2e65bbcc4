//! ctmn - Cytomine deployment configuration generator
//!
//! This is the main CLI entry point for ctmn.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ctmn::config::find_config_file;
use ctmn::deploy::{DeployOptions, Deployer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ctmn - Cytomine deployment configuration generator
#[derive(Parser)]
#[command(name = "ctmn")]
#[command(author = "Cytomine Corporation")]
#[command(version)]
#[command(about = "Generates docker-compose based deployment configuration for Cytomine", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate env files and compose overrides
    Deploy {
        /// Directory holding cytomine.yml and the compose files
        #[arg(short, long, env = "CTMN_SOURCE_DIR", default_value = ".")]
        source: PathBuf,
        /// Directory to write the deployment to (defaults to the source)
        #[arg(short, long)]
        target: Option<PathBuf>,
        /// Extra configuration merged over cytomine.yml
        #[arg(short, long = "config")]
        config: Vec<PathBuf>,
        /// Generate new values instead of reusing the previous deployment's
        #[arg(long)]
        regenerate: bool,
        /// Show what would be written without writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration against the compose files
    Check {
        /// Directory holding cytomine.yml and the compose files
        #[arg(short, long, env = "CTMN_SOURCE_DIR", default_value = ".")]
        source: PathBuf,
        /// Extra configuration merged over cytomine.yml
        #[arg(short, long = "config")]
        config: Vec<PathBuf>,
    },

    /// Print the merged configuration
    Config {
        /// Directory holding cytomine.yml
        #[arg(short, long, env = "CTMN_SOURCE_DIR", default_value = ".")]
        source: PathBuf,
        /// Extra configuration merged over cytomine.yml
        #[arg(short, long = "config")]
        config: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,
    },

    /// List configured servers and services
    #[command(name = "ls")]
    List {
        /// Directory holding cytomine.yml
        #[arg(short, long, env = "CTMN_SOURCE_DIR", default_value = ".")]
        source: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn deploy_options(source: PathBuf, overlays: Vec<PathBuf>) -> DeployOptions {
    overlays
        .iter()
        .fold(DeployOptions::new(&source), |options, path| options.overlay(path))
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Deploy {
            source,
            target,
            config,
            regenerate,
            dry_run,
        } => {
            let mut options = deploy_options(source, config)
                .regenerate(regenerate)
                .dry_run(dry_run);
            if let Some(target) = target {
                options = options.target(&target);
            }

            let report = Deployer::new(options)
                .deploy()
                .context("deployment failed")?;

            for warning in &report.warnings {
                tracing::warn!("{}", warning);
            }
            for file in &report.files {
                if report.dry_run {
                    println!("would write {}", file.display());
                } else {
                    println!("wrote {}", file.display());
                }
            }
            if report.kept_generated > 0 {
                tracing::info!("Kept {} previously generated values", report.kept_generated);
            }
        }

        Commands::Check { source, config } => {
            let warnings = Deployer::new(deploy_options(source, config))
                .check()
                .context("configuration check failed")?;

            for warning in &warnings {
                println!("Warning: {}", warning);
            }
            println!("Configuration is valid");
        }

        Commands::Config {
            source,
            config,
            format,
        } => {
            let (config, _) = Deployer::new(deploy_options(source, config))
                .load_config()
                .context("failed to load configuration")?;

            match format {
                Format::Yaml => print!("{}", config.to_yaml()?),
                Format::Json => println!("{}", config.to_json()?),
            }
        }

        Commands::List { source } => {
            let path = find_config_file(&source).with_context(|| {
                format!("no cytomine.yml in {}", source.display())
            })?;
            let config = ctmn::config::ConfigFile::load(&path, true)?;

            for server in config.servers() {
                println!("{}", server);
                for service in config.services(&server)? {
                    println!("  {}", service);
                }
            }
        }
    }

    Ok(())
}
