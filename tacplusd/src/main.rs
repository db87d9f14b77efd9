//! The `tacplusd` binary: CLI parsing, logging setup, config load, serve.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tacplusd::config::{config_handle, Config, RuntimeConfig};
use tacplusd::connection::ConnectionSettings;
use tacplusd::secrets::ConfigSecretProvider;
use tacplusd::server::{Server, ServerSettings};

/// An RFC8907 TACACS+ server.
#[derive(Debug, Parser)]
#[command(name = "tacplusd", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:49")]
    listen: SocketAddr,

    /// Expect a PROXY protocol v1 preamble on every connection.
    #[arg(long)]
    proxy_protocol: bool,

    /// The transport already provides confidentiality (e.g. a TLS-terminating
    /// frontend): disable body obfuscation and require peers to set the
    /// unencrypted flag.
    #[arg(long)]
    clear_mode: bool,

    /// Seconds a connection may stay quiet between packets.
    #[arg(long, default_value_t = 15)]
    read_timeout: u64,

    /// Seconds allowed for writing one reply.
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,

    /// Seconds to wait for in-flight connections on shutdown.
    #[arg(long, default_value_t = 30)]
    shutdown_grace: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(error) => {
            error!(path = %args.config.display(), %error, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let handle = config_handle(RuntimeConfig::build(&config));
    let secrets = Arc::new(ConfigSecretProvider::new(handle));

    let settings = ServerSettings {
        shutdown_grace: Duration::from_secs(args.shutdown_grace),
        connection: ConnectionSettings {
            read_timeout: Duration::from_secs(args.read_timeout),
            write_timeout: Duration::from_secs(args.write_timeout),
            proxy_protocol: args.proxy_protocol,
            clear_mode: args.clear_mode,
        },
        ..ServerSettings::default()
    };

    let listener = match TcpListener::bind(args.listen).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(listen = %args.listen, %error, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, beginning graceful shutdown");
            signal_cancel.cancel();
        }
    });

    let server = Server::new(secrets, settings);
    match server.serve(listener, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "server terminated abnormally");
            ExitCode::FAILURE
        }
    }
}
