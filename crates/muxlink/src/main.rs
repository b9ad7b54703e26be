mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "muxlink",
    version,
    about = "Multiplex many TCP connections over one obfuscated link"
)]
struct Cli {
    /// Session summary format (stdout).
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "MUXLINK_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "MUXLINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    /// JSON file with multiplexer settings.
    #[arg(long, value_name = "FILE", env = "MUXLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// XOR mask byte, decimal or 0x-prefixed hex. Both ends must agree.
    #[arg(
        long,
        value_name = "BYTE",
        env = "MUXLINK_MASK",
        value_parser = parse_mask,
        global = true
    )]
    mask: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

fn parse_mask(raw: &str) -> Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|err| format!("invalid mask byte {raw:?}: {err}"))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::load_config(cli.config.as_deref(), cli.mask)
        .and_then(|config| cmd::run(cli.command, config, format));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
