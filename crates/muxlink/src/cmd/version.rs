use muxlink_core::MuxConfig;
use muxlink_frame::{HEADER_SIZE, MAX_CHANNELS};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs, config: &MuxConfig) -> CliResult<i32> {
    if !args.extended {
        println!("muxlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: muxlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MUXLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("frame_header_bytes: {HEADER_SIZE}");
    println!("max_channels: {MAX_CHANNELS}");
    println!("mask: 0x{:02x}", config.mask);

    Ok(SUCCESS)
}
