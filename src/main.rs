//! Respline server
//!
//! Entry point: parses the command line, sets up logging, builds the
//! shared watch registry, keyspace and dispatcher, and serves connections
//! until Ctrl+C.

use anyhow::{bail, Context};
use respline::commands::{strings, Dispatcher};
use respline::connection::{handle_connection, ConnectionStats};
use respline::session::Session;
use respline::storage::Keyspace;
use respline::watch::WatchRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug)]
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Default log filter when `RUST_LOG` is unset
    log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: respline::DEFAULT_HOST.to_string(),
            port: respline::DEFAULT_PORT,
            log_level: "info".to_string(),
        }
    }
}

/// What the command line asked for.
enum Action {
    Serve(Config),
    Help,
    Version,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Action> {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().context("--host requires a value")?;
                }
                "--port" | "-p" => {
                    let value = args.next().context("--port requires a value")?;
                    config.port = value
                        .parse()
                        .with_context(|| format!("invalid port number '{}'", value))?;
                }
                "--log-level" | "-l" => {
                    config.log_level = args.next().context("--log-level requires a value")?;
                }
                "--help" => return Ok(Action::Help),
                "--version" | "-v" => return Ok(Action::Version),
                other => bail!("unknown argument: {}", other),
            }
        }

        Ok(Action::Serve(config))
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
Respline - A Redis-protocol session engine

USAGE:
    respline [OPTIONS]

OPTIONS:
    -h, --host <HOST>         Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>         Port to listen on (default: 6379)
    -l, --log-level <LEVEL>   Log filter when RUST_LOG is unset (default: info)
    -v, --version             Print version information
        --help                Print this help message

EXAMPLES:
    respline                       # Start on 127.0.0.1:6379
    respline --port 6380           # Start on port 6380
    respline -l debug              # Log handler failures and close requests

CONNECTING:
    $ redis-cli -p 6379
    127.0.0.1:6379> WATCH balance
    OK
    127.0.0.1:6379> MULTI
    OK
    127.0.0.1:6379> INCRBY balance 10
    QUEUED
    127.0.0.1:6379> EXEC
    1) (integer) 10
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1))? {
        Action::Serve(config) => config,
        Action::Help => {
            print_help();
            return Ok(());
        }
        Action::Version => {
            println!("respline version {}", respline::VERSION);
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = respline::VERSION, "Starting respline");

    // Shared across all connections
    let registry = Arc::new(WatchRegistry::new());
    let keyspace = Arc::new(Keyspace::new(0, Arc::clone(&registry)));

    let mut dispatcher = Dispatcher::new();
    strings::register(&mut dispatcher, keyspace);
    let dispatcher = Arc::new(dispatcher);
    info!(commands = dispatcher.commands().len(), "Dispatcher ready");

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    tokio::select! {
        _ = accept_loop(listener, dispatcher, registry, stats) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Accepts connections forever, giving each its own session and task.
async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<WatchRegistry>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let session = Session::new(Arc::clone(&dispatcher), Arc::clone(&registry));
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, session, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Action> {
        Config::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let Ok(Action::Serve(config)) = parse(&[]) else {
            panic!("expected serve");
        };
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let Ok(Action::Serve(config)) = parse(&["-h", "0.0.0.0", "--port", "7000", "-l", "debug"])
        else {
            panic!("expected serve");
        };
        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_flags() {
        assert!(parse(&["--port", "many"]).is_err());
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(matches!(parse(&["--help"]), Ok(Action::Help)));
        assert!(matches!(parse(&["-v"]), Ok(Action::Version)));
    }
}
