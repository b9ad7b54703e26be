use std::path::Path;

use clap::{Args, Subcommand};
use muxlink_core::MuxConfig;
use tracing::debug;

use crate::exit::{io_error, mux_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod client;
pub mod server;
mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept the shared transport and multiplex local consumers over it.
    Server(ServerArgs),
    /// Dial the shared transport and connect channels to a local service.
    Client(ClientArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, config: MuxConfig, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, config, format),
        Command::Client(args) => client::run(args, config, format),
        Command::Version(args) => version::run(args, &config),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to accept the shared transport on.
    #[arg(long, default_value = ":8888", env = "MUXLINK_LISTEN_SERVER")]
    pub listen_server: String,
    /// Address to accept local consumers on.
    #[arg(long, default_value = ":8889", env = "MUXLINK_LISTEN_CLIENT")]
    pub listen_client: String,
    /// Also serve channels opened by the client, dialing this address.
    #[arg(long, value_name = "ADDR", env = "MUXLINK_TARGET")]
    pub target: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Address of the server's transport listener.
    #[arg(long, default_value = "127.0.0.1:8888", env = "MUXLINK_BACKEND_ADDR")]
    pub backend_addr: String,
    /// Service each new channel is connected to.
    #[arg(long, default_value = "127.0.0.1:80", env = "MUXLINK_LOCAL_ADDR")]
    pub local_addr: String,
    /// Also accept local consumers here. Do not combine with a server-side
    /// consumer listener: both ends would pick identifiers independently.
    #[arg(long, value_name = "ADDR", env = "MUXLINK_LISTEN")]
    pub listen: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Resolve the multiplexer settings: defaults, then `path`, then `mask`.
pub fn load_config(path: Option<&Path>, mask: Option<u8>) -> CliResult<MuxConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
            serde_json::from_str::<MuxConfig>(&raw).map_err(|err| {
                CliError::new(DATA_INVALID, format!("parse {}: {err}", path.display()))
            })?
        }
        None => MuxConfig::default(),
    };
    if let Some(mask) = mask {
        config.mask = mask;
    }
    config
        .validate()
        .map_err(|err| mux_error("config", err))?;
    debug!(?config, "configuration loaded");
    Ok(config)
}
