use muxlink_core::{Bundle, MuxConfig, TcpDialer};
use muxlink_transport::tcp;

use crate::cmd::{session, ClientArgs};
use crate::exit::{mux_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: ClientArgs, config: MuxConfig, format: OutputFormat) -> CliResult<i32> {
    let consumers = args
        .listen
        .as_deref()
        .map(tcp::listen)
        .transpose()
        .map_err(|err| transport_error("bind consumer listener failed", err))?;

    let transport = tcp::connect(&args.backend_addr)
        .map_err(|err| transport_error("connect to server failed", err))?;
    let (bundle, reader) =
        Bundle::over_tcp(transport, config).map_err(|err| mux_error("transport setup failed", err))?;

    let dialer = TcpDialer::new(&args.local_addr);
    session::run("client", bundle, reader, dialer, consumers, format)
}
