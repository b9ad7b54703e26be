//! Loopback example: both ends of a tunnel in one process.
//!
//! An echo service sits behind the client end; three consumers talk to it
//! concurrently through the server end's consumer listener.
//!
//! Run with:
//!   cargo run --example loopback

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use muxlink::mux::{Bundle, MuxConfig, NoDialer, TcpDialer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let echo = TcpListener::bind("127.0.0.1:0")?;
    let echo_addr = echo.local_addr()?;
    thread::spawn(move || {
        for stream in echo.incoming().flatten() {
            thread::spawn(move || {
                let mut stream = stream;
                if let Ok(mut reader) = stream.try_clone() {
                    let _ = std::io::copy(&mut reader, &mut stream);
                }
            });
        }
    });

    let transport = TcpListener::bind("127.0.0.1:0")?;
    let client_end = TcpStream::connect(transport.local_addr()?)?;
    let (server_end, _) = transport.accept()?;

    let (server, server_reader) = Bundle::over_tcp(server_end, MuxConfig::default())?;
    let (client, client_reader) = Bundle::over_tcp(client_end, MuxConfig::default())?;

    let dispatcher = server.dispatcher(server_reader, NoDialer);
    thread::spawn(move || dispatcher.run());
    let dispatcher = client.dispatcher(client_reader, TcpDialer::new(&echo_addr.to_string()));
    thread::spawn(move || dispatcher.run());

    let consumers = TcpListener::bind("127.0.0.1:0")?;
    let consumer_addr = consumers.local_addr()?;
    let acceptor = server.clone();
    thread::spawn(move || acceptor.serve_listener(&consumers));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            thread::spawn(move || -> std::io::Result<String> {
                let mut stream = TcpStream::connect(consumer_addr)?;
                let message = format!("hello from consumer {i}");
                stream.write_all(message.as_bytes())?;
                let mut echoed = vec![0u8; message.len()];
                stream.read_exact(&mut echoed)?;
                Ok(String::from_utf8_lossy(&echoed).into_owned())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok(reply)) => eprintln!("[consumer] {reply}"),
            Ok(Err(err)) => eprintln!("[consumer] error: {err}"),
            Err(_) => eprintln!("[consumer] thread panicked"),
        }
    }

    eprintln!("[server] {}", serde_json::to_string(&server.stats())?);
    Ok(())
}
