use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use muxlink_core::{Bundle, Dialer, MuxError};
use muxlink_frame::FrameReader;
use tracing::{info, warn};

use crate::exit::{mux_error, transport_lost, CliError, CliResult, INTERNAL, INTERRUPTED};
use crate::output::{print_summary, EndReason, OutputFormat};

enum Outcome {
    Interrupted,
    TransportLost(MuxError),
    ListenerFailed(MuxError),
}

/// Drive one shared transport until it drops, the consumer listener fails
/// or the process is interrupted. The summary is printed in every case.
pub fn run<D>(
    role: &str,
    bundle: Bundle,
    reader: FrameReader<TcpStream>,
    dialer: D,
    consumers: Option<TcpListener>,
    format: OutputFormat,
) -> CliResult<i32>
where
    D: Dialer + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    install_ctrlc_handler(tx.clone())?;

    let dispatcher = bundle.dispatcher(reader, dialer);
    let dispatch_tx = tx.clone();
    thread::Builder::new()
        .name("mux-dispatch".to_string())
        .spawn(move || {
            let err = dispatcher.run();
            let _ = dispatch_tx.send(Outcome::TransportLost(err));
        })
        .map_err(|err| spawn_failed("dispatch", err))?;

    if let Some(listener) = consumers {
        let acceptor = bundle.clone();
        thread::Builder::new()
            .name("mux-accept".to_string())
            .spawn(move || {
                if let Err(err) = acceptor.serve_listener(&listener) {
                    let _ = tx.send(Outcome::ListenerFailed(err));
                }
            })
            .map_err(|err| spawn_failed("accept", err))?;
    } else {
        drop(tx);
    }

    // The signal handler keeps a sender alive, so this only fails if the
    // handler itself is gone.
    let outcome = rx.recv().unwrap_or(Outcome::Interrupted);
    let stats = bundle.stats();
    match outcome {
        Outcome::Interrupted => {
            info!(active = stats.active_channels, "interrupted");
            print_summary(role, EndReason::Interrupted, &stats, format);
            Ok(INTERRUPTED)
        }
        Outcome::TransportLost(err) => {
            print_summary(role, EndReason::TransportLost, &stats, format);
            Err(transport_lost(err))
        }
        Outcome::ListenerFailed(err) => {
            warn!(error = %err, "consumer listener failed");
            print_summary(role, EndReason::ListenerFailed, &stats, format);
            Err(mux_error("consumer listener failed", err))
        }
    }
}

fn install_ctrlc_handler(tx: mpsc::Sender<Outcome>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = tx.send(Outcome::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn spawn_failed(name: &str, err: std::io::Error) -> CliError {
    CliError::new(INTERNAL, format!("failed to start {name} thread: {err}"))
}
