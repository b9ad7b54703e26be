use muxlink_core::{Bundle, MuxConfig, NoDialer, TcpDialer};
use muxlink_transport::tcp;
use tracing::info;

use crate::cmd::{session, ServerArgs};
use crate::exit::{mux_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub fn run(args: ServerArgs, config: MuxConfig, format: OutputFormat) -> CliResult<i32> {
    // Bind both listeners up front so a bad address fails before any client
    // connects.
    let transport_listener = tcp::listen(&args.listen_server)
        .map_err(|err| transport_error("bind transport listener failed", err))?;
    let consumers = tcp::listen(&args.listen_client)
        .map_err(|err| transport_error("bind consumer listener failed", err))?;

    info!(addr = %args.listen_server, "waiting for client transport");
    let transport = tcp::accept(&transport_listener)
        .map_err(|err| transport_error("accept transport failed", err))?;
    // One shared transport per process.
    drop(transport_listener);

    let (bundle, reader) =
        Bundle::over_tcp(transport, config).map_err(|err| mux_error("transport setup failed", err))?;

    match args.target.as_deref() {
        Some(target) => session::run(
            "server",
            bundle,
            reader,
            TcpDialer::new(target),
            Some(consumers),
            format,
        ),
        None => session::run("server", bundle, reader, NoDialer, Some(consumers), format),
    }
}
