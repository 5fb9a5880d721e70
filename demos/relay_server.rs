//! Live audio relay server
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8080
//!   cargo run --example relay_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example relay_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Producing
//!
//! Connect a WebSocket client and send:
//!   {"type":"producer-ready","title":"Morning show","codec":"audio/webm;codecs=opus","display_name":"dj"}
//! then stream the encoder output as binary frames. The first binary frame
//! must be the container header; it is replayed to every late listener.
//!
//! ## Listening
//!
//!   {"type":"consumer-join","session_id":"<id from session-list-updated>","display_name":"guest"}
//!
//! Binary frames received afterwards are the producer's chunks, in order.

use std::net::SocketAddr;
use std::time::Duration;

use liverelay::{RelayConfig, RelayServer, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("liverelay=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let config = config.relay(
        RelayConfig::default()
            .history_capacity(100)
            .sweep_interval(Duration::from_secs(30)),
    );

    println!("Starting relay server on ws://{}", config.bind_addr);

    let server = RelayServer::new(config);
    let hub = server.hub().clone();

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    let stats = hub.stats().await;
    println!(
        "Served {} connections and {} sessions in {}s",
        stats.total_connections,
        stats.total_sessions,
        stats.uptime.as_secs()
    );

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
