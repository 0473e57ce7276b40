mod commands;
mod errors;

use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    commands::{Commands, exec_request},
    errors::{CliError, Result},
};
use chainyard::pull::pull_images;
use chainyard::{
    CatKind, ChainOrchestrator, ChainRef, CleanupRequest, DockerCli, HeadChange, Paths, Settings,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Chainyard - provision, run and tear down containerised chain nodes
#[derive(Parser, Debug)]
#[command(name = "chainyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for definitions and data (default: $CHAINYARD_ROOT or ~/.chainyard)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Container client binary
    #[arg(long, global = true, default_value = "docker")]
    pub docker: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error [{}]: {}", e.class(), e);
        if let Some(hint) = e.hint() {
            eprintln!("  hint: {}", hint);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_target(false)
        .init();

    let paths = match &cli.root {
        Some(root) => Paths::new(root),
        None => Paths::from_env()?,
    };
    paths.ensure_dirs()?;
    let settings = Settings::load(&paths)?;
    let runtime = Arc::new(DockerCli::new(&settings).with_binary(&cli.docker));
    let orchestrator = ChainOrchestrator::new(paths, settings, runtime);

    match cli.command {
        Commands::New { provision } => {
            orchestrator.new_chain(&provision.request()?).await?;
            println!("Chain {} created", provision.name);
        }

        Commands::Install { provision } => {
            orchestrator.install_chain(&provision.request()?).await?;
            println!("Chain {} installed", provision.name);
        }

        Commands::Start { name, launch } => {
            let name = resolve_name(&orchestrator, name)?;
            orchestrator.start_chain(&launch.request(name.clone())?).await?;
            println!("Chain {} started", name);
        }

        Commands::Exec {
            name,
            image,
            interactive,
            wiring,
            args,
        } => {
            let req = exec_request(name, image, interactive, &wiring, args)?;
            let output = orchestrator.exec_chain(&req).await?;
            print!("{}", output);
        }

        Commands::Stop { name, stop, rm, data } => {
            let name = resolve_name(&orchestrator, name)?;
            let mut req = stop.request(name);
            req.rm = rm;
            req.rm_data = rm && data;
            orchestrator.kill_chain(&req).await?;
        }

        Commands::Rm {
            name,
            stop,
            data,
            file,
        } => {
            let name = resolve_name(&orchestrator, name)?;
            let mut req = stop.request(name);
            req.rm_data = data;
            req.rm_host_files = file;
            orchestrator.remove_chain(&req).await?;
        }

        Commands::Throwaway { name, launch } => {
            let chain = orchestrator.throwaway_chain(&launch.request(name)?).await?;
            println!("{}", chain.name);
        }

        Commands::Clean { name } => {
            let req = CleanupRequest {
                chain: Some(ChainRef::throwaway(name)),
                ..Default::default()
            };
            orchestrator.cleanup(&req).await?;
        }

        Commands::Cat { name, what } => {
            let kind: CatKind = what.parse()?;
            let output = orchestrator.cat_chain(&name, kind).await?;
            print!("{}", output);
        }

        Commands::Checkout { name } => match orchestrator.checkout_chain(name.as_deref())? {
            HeadChange::Cleared => println!("Cleared checked out chain"),
            HeadChange::Unchanged => println!("No change"),
            HeadChange::Changed(name) => println!("Checked out {}", name),
        },

        Commands::Current => match orchestrator.current_chain()? {
            Some(name) => println!("{}", name),
            None => println!("No chain checked out"),
        },

        Commands::Logs { name, follow, tail } => {
            let name = resolve_name(&orchestrator, name)?;
            print!("{}", orchestrator.logs_chain(&name, follow, &tail).await?);
        }

        Commands::Inspect { name, field } => {
            let name = resolve_name(&orchestrator, name)?;
            println!("{}", orchestrator.inspect_chain(&name, &field).await?.trim_end());
        }

        Commands::Ports { name } => {
            let name = resolve_name(&orchestrator, name)?;
            for mapping in orchestrator.ports_chain(&name).await? {
                println!("{}", mapping);
            }
        }

        Commands::Update {
            name,
            pull,
            stop,
            wiring,
        } => {
            let name = resolve_name(&orchestrator, name)?;
            let mut req = stop.request(name.clone());
            req.pull = pull;
            req.env = wiring.environment()?;
            req.links = wiring.links.clone();
            orchestrator.update_chain(&req).await?;
            println!("Chain {} updated", name);
        }

        Commands::Pull { images } => {
            let images = if images.is_empty() {
                orchestrator.settings().default_images.clone()
            } else {
                images
            };
            pull_images(orchestrator.runtime().clone(), orchestrator.settings(), &images).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG`, when set and valid, overrides the verbosity flag.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            if verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("warn")
            }
        })
}

/// The given chain name, or the checked out one.
fn resolve_name(orchestrator: &ChainOrchestrator, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => orchestrator.current_chain()?.ok_or(CliError::NoChainSelected),
    }
}

#[cfg(test)]
mod tests;
