use clap::{Args, Subcommand};
use std::path::PathBuf;

use chainyard::RuntimeRequest;
use chainyard::env::load_env_file;

use crate::errors::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a new chain and start it
    New {
        #[command(flatten)]
        provision: ProvisionArgs,
    },
    /// Provision a chain from existing genesis/config files
    Install {
        #[command(flatten)]
        provision: ProvisionArgs,
    },
    /// Start a provisioned chain
    Start {
        /// Chain to start (defaults to the checked out chain)
        name: Option<String>,
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Run a one-off command in a container linked to the chain
    Exec {
        /// Chain to run against
        name: String,
        /// Image to run instead of the chain image
        #[arg(long)]
        image: Option<String>,
        /// Keep stdin attached
        #[arg(short, long)]
        interactive: bool,
        #[command(flatten)]
        wiring: WiringArgs,
        /// Command and arguments
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
    /// Stop a running chain
    Stop {
        name: Option<String>,
        #[command(flatten)]
        stop: StopArgs,
        /// Remove the container after stopping
        #[arg(long)]
        rm: bool,
        /// With --rm, also remove the data volume
        #[arg(long)]
        data: bool,
    },
    /// Remove a chain's containers
    Rm {
        name: Option<String>,
        #[command(flatten)]
        stop: StopArgs,
        /// Also remove the data volume
        #[arg(long)]
        data: bool,
        /// Also remove the host-side data directory
        #[arg(long)]
        file: bool,
    },
    /// Provision and start a disposable chain with a random suffix
    Throwaway {
        /// Base name; the chain is named <name>_<8 hex chars>
        #[arg(default_value = "throwaway")]
        name: String,
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Remove a throwaway chain with its volume, data and definition
    Clean {
        name: String,
    },
    /// Show one aspect of a chain: genesis, config, status, validators, definition
    Cat {
        name: String,
        what: String,
    },
    /// Check out a chain; without a name, clear the checked out chain
    Checkout {
        name: Option<String>,
    },
    /// Print the checked out chain
    Current,
    /// Show chain container logs
    Logs {
        name: Option<String>,
        /// Follow log output
        #[arg(long)]
        follow: bool,
        /// Number of lines to show from the end ("all" for everything)
        #[arg(short = 'n', long, default_value = "150")]
        tail: String,
    },
    /// Inspect the chain container (Major.Minor field or "all")
    Inspect {
        name: Option<String>,
        #[arg(default_value = "all")]
        field: String,
    },
    /// Show host port mappings of the chain container
    Ports {
        name: Option<String>,
    },
    /// Recreate the chain container, keeping its data volume
    Update {
        name: Option<String>,
        /// Pull the image before recreating
        #[arg(long)]
        pull: bool,
        #[command(flatten)]
        stop: StopArgs,
        #[command(flatten)]
        wiring: WiringArgs,
    },
    /// Pull images (the configured default images if none are given)
    Pull {
        images: Vec<String>,
    },
}

/// Environment, links and ports for a container.
#[derive(Args, Debug, Default, Clone)]
pub struct WiringArgs {
    /// Environment variable (KEY=value), repeatable
    #[arg(short, long = "env")]
    pub env: Vec<String>,
    /// Read environment variables from a .env file
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    /// Container link (name:alias), repeatable
    #[arg(short, long = "link")]
    pub links: Vec<String>,
    /// Publish all exposed ports to random host ports
    #[arg(short = 'P', long)]
    pub publish: bool,
    /// Port mapping (host:container), repeatable
    #[arg(short, long = "port")]
    pub ports: Vec<String>,
}

impl WiringArgs {
    /// Environment from `--env-file` followed by `--env` entries.
    pub fn environment(&self) -> Result<Vec<String>> {
        let mut env = match &self.env_file {
            Some(path) => load_env_file(path)?,
            None => Vec::new(),
        };
        env.extend(self.env.iter().cloned());
        Ok(env)
    }

    fn apply(&self, req: &mut RuntimeRequest) -> Result<()> {
        req.env = self.environment()?;
        req.links = self.links.clone();
        req.publish_all_ports = self.publish;
        req.ports = self.ports.clone();
        Ok(())
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct LaunchArgs {
    /// Enable the node API
    #[arg(long)]
    pub api: bool,
    /// Also boot the logrotate service
    #[arg(long)]
    pub logrotate: bool,
    #[command(flatten)]
    pub wiring: WiringArgs,
}

impl LaunchArgs {
    pub fn request(&self, name: String) -> Result<RuntimeRequest> {
        let mut req = RuntimeRequest::named(name);
        self.wiring.apply(&mut req)?;
        req.run = self.api;
        req.logrotate = self.logrotate;
        Ok(req)
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct ProvisionArgs {
    /// Chain name
    pub name: String,
    /// Chain id (defaults to the name)
    #[arg(long)]
    pub chain_id: Option<String>,
    /// Directory with chain files, or the name of a directory under chains/
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Genesis file to use
    #[arg(long)]
    pub genesis: Option<PathBuf>,
    /// Node config file to use
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Validator key file to use
    #[arg(long = "priv")]
    pub priv_validator: Option<PathBuf>,
    /// Config generator option (key=value), repeatable
    #[arg(long = "option")]
    pub options: Vec<String>,
    /// Address of a node to connect to
    #[arg(long, default_value = "")]
    pub gateway: String,
    #[command(flatten)]
    pub launch: LaunchArgs,
}

impl ProvisionArgs {
    pub fn request(&self) -> Result<RuntimeRequest> {
        let mut req = self.launch.request(self.name.clone())?;
        req.chain_id = self.chain_id.clone();
        req.path = self.dir.clone();
        req.genesis = self.genesis.clone();
        req.config_file = self.config.clone();
        req.priv_validator = self.priv_validator.clone();
        req.config_opts = self.options.clone();
        req.gateway = self.gateway.clone();
        Ok(req)
    }
}

/// How to stop a container.
#[derive(Args, Debug, Default, Clone)]
pub struct StopArgs {
    /// Kill without waiting for a graceful stop
    #[arg(long)]
    pub force: bool,
    /// Also remove anonymous volumes
    #[arg(long)]
    pub volumes: bool,
    /// Seconds to wait for a graceful stop
    #[arg(short, long)]
    pub timeout: Option<u32>,
}

impl StopArgs {
    pub fn request(&self, name: String) -> RuntimeRequest {
        RuntimeRequest {
            force: self.force,
            volumes: self.volumes,
            timeout: self.timeout,
            ..RuntimeRequest::named(name)
        }
    }
}

/// Exec request from its parts.
pub fn exec_request(
    name: String,
    image: Option<String>,
    interactive: bool,
    wiring: &WiringArgs,
    args: Vec<String>,
) -> Result<RuntimeRequest> {
    let mut req = RuntimeRequest::exec(name, args);
    wiring.apply(&mut req)?;
    req.image = image;
    req.interactive = interactive;
    Ok(req)
}
