//! Demo: one server, a handful of in-process clients, and the fan-out
//! publish loop.
//!
//! Registers the echo and arithmetic services plus the generic endpoint,
//! spawns `/stream` subscribers through the client library, fires a few
//! unary calls, then runs the publish loop: one lettered payload every
//! interval, a fan shutdown, and one final publish to flush the parked
//! subscribers with the sentinel.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use client::Channel;
use config::Config;
use protocol_echo::{Arith, Echo, EchoRequest, MathRequest, arith_service, echo_service};
use server::{Fan, Server};
use transport::Credentials;

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Fan-out RPC server demo")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of publishes.
    #[arg(long)]
    publishes: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(publishes) = args.publishes {
        config.publish.count = publishes;
    }
    server::logging::init(&config.logging);

    let fan = Arc::new(Fan::new());
    let server = Server::builder()
        .add_listening_port(config.listen.clone(), Credentials::Insecure)
        .register_service(echo_service())
        .register_service(arith_service())
        .register_generic(fan.clone())
        .build_and_start()?;
    let port = server.bound_ports().first().map(|p| p.port).unwrap_or(0);
    tracing::info!(listen = %config.listen, port, "server up");

    let channel = Channel::new(server.connector());

    // Unary demos, straight out of the original clients.
    let reply = channel.call::<Echo>(&EchoRequest {
        input: "world".to_string(),
    })?;
    tracing::info!(output = %reply.output, "echo replied");
    let reply = channel.call::<Arith>(&MathRequest { input: 13 })?;
    tracing::info!(output = reply.output, "arithmetic replied");

    // Stream subscribers, each draining frames until the sentinel.
    let mut watchers = Vec::new();
    for id in 0..config.subscribers {
        let channel = channel.clone();
        watchers.push(thread::spawn(move || watch(id, &channel)));
    }

    // The publish loop: a lettered payload at a fixed cadence.
    let interval = Duration::from_millis(config.publish.interval_ms);
    let mut i = 0;
    while i < config.publish.count {
        publish_lettered(&fan, (b'A' + (i as u8 & 31)) as char, i);
        thread::sleep(interval);
        i += 1;
    }
    fan.shutdown();
    publish_lettered(&fan, '-', i);

    for watcher in watchers {
        match watcher.join() {
            Ok(frames) => tracing::info!(frames, "subscriber drained"),
            Err(_) => tracing::warn!("subscriber panicked"),
        }
    }

    drop(server);
    Ok(())
}

/// `data: <letter> <msg#> <#parked-calls> `, matching the wire format the
/// index page's script parses.
fn publish_lettered(fan: &Fan, letter: char, i: usize) {
    fan.publish(format!("data: {letter} {i:10} {:6} ", fan.num_calls()));
}

/// Drain one subscription until the stream ends; returns frames seen.
fn watch(id: usize, channel: &Channel) -> usize {
    let subscription = match channel.subscribe("/stream") {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(id, error = %e, "subscribe failed");
            return 0;
        }
    };
    let mut frames = 0;
    loop {
        match subscription.next_frame() {
            Ok(Some(frame)) => {
                frames += 1;
                tracing::debug!(id, frame = %String::from_utf8_lossy(&frame).trim_end(), "frame");
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(id, error = %e, "stream error");
                break;
            }
        }
    }
    frames
}
