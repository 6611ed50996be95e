//! A tiny smoke-test front door over `tempest-client`/`tempest-server`
//! (spec.md §9's "CLI smoke binary"). Two subcommands: `serve` starts a
//! bare server that logs each completed handshake, and `ping` connects to
//! one, reports the handshake round trip, and disconnects gracefully.
//! Tempest is a transport library, not an application, so this binary is
//! deliberately thin — it exists to exercise the facade end to end, not to
//! replace the sample chat app spec.md §1 declares out of scope.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use tempest_client::{Client, Target};
use tempest_core::{DisconnectReason, TempestConfig};
use tempest_crypto::RsaKeypair;
use tempest_protocol::{ProtocolDescriptor, CONTROL_PROTOCOL_ID};
use tempest_server::{ConnectionMade, Server};

#[derive(Parser)]
#[command(name = "tempest", about = "Smoke-test front door for the Tempest transport core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connects to a Tempest server, runs the handshake, and reports the round trip.
    Ping {
        /// Target in `host:port` form.
        target: String,
    },
    /// Starts a bare Tempest server that accepts the handshake and logs each connection.
    Serve {
        /// Address to bind, e.g. `0.0.0.0:4433`.
        addr: SocketAddr,
    },
}

fn parse_target(raw: &str) -> Result<Target, String> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {raw:?}"))?;
    let port: u16 = port.parse().map_err(|_| format!("invalid port in {raw:?}"))?;
    Ok(Target::new(host, port))
}

fn control_protocol() -> ProtocolDescriptor {
    ProtocolDescriptor {
        id: CONTROL_PROTOCOL_ID,
        version: 1,
    }
}

fn generate_keypair() -> RsaKeypair {
    RsaKeypair::generate(&mut rand::rngs::OsRng).expect("RSA key generation")
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tempest_core::telemetry::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ping { target } => run_ping(&target).await,
        Command::Serve { addr } => run_serve(addr).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run_ping(raw_target: &str) -> Result<(), String> {
    let target = parse_target(raw_target)?;
    let started = Instant::now();
    let client = Client::connect(
        &target,
        TempestConfig::default(),
        generate_keypair(),
        vec![control_protocol()],
        |_ctx| {},
    )
    .await
    .map_err(|err| err.to_string())?;
    let elapsed = started.elapsed();

    println!(
        "connected to {target} in {:.1} ms (connection_id={}, protocols={:?})",
        elapsed.as_secs_f64() * 1000.0,
        client.connection_id(),
        client.enabled_protocols(),
    );

    let mut disconnected = client.subscribe_disconnected();
    client.disconnect(false, DisconnectReason::Success);
    let _ = tokio::time::timeout(Duration::from_secs(2), disconnected.recv()).await;
    Ok(())
}

async fn run_serve(addr: SocketAddr) -> Result<(), String> {
    let handle = Server::start(
        addr,
        TempestConfig::default(),
        generate_keypair(),
        generate_keypair(),
        |_ctx| {},
        |event: &ConnectionMade| {
            tracing::info!(connection_id = event.connection.connection_id(), "connection made");
        },
    )
    .await
    .map_err(|err| err.to_string())?;

    println!("listening on {}", handle.local_addr());
    tokio::signal::ctrl_c().await.map_err(|err| err.to_string())?;
    handle.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_splits_host_and_port() {
        let target = parse_target("example.com:4433").unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 4433);
    }

    #[test]
    fn parse_target_rejects_missing_port() {
        assert!(parse_target("example.com").is_err());
    }

    #[test]
    fn parse_target_handles_ipv6_with_brackets_and_port() {
        let target = parse_target("[::1]:4433").unwrap();
        assert_eq!(target.port(), 4433);
    }
}
