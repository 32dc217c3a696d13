//! rpc command line interface
//!
//! # Commands
//!
//! - `rpc serve` - Serve the demo `Calc` service until Ctrl-C
//! - `rpc call` - Send one request and print its result

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rpc_engine::{RpcClient, RpcServer, Transport};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// JSON-RPC 2.0 over HTTP or TCP
#[derive(Parser)]
#[command(name = "rpc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Endpoint {
    /// Transport binding: http or tcp
    #[arg(short, long, env = "RPC_TRANSPORT", default_value = "http")]
    transport: Transport,

    /// Address to listen on or connect to
    #[arg(short, long, env = "RPC_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo Calc service
    Serve {
        #[command(flatten)]
        endpoint: Endpoint,

        /// Sustained requests per second admitted by the rate limiter
        #[arg(long, env = "RPC_RATE", requires = "burst")]
        rate: Option<f64>,

        /// Burst capacity of the rate limiter
        #[arg(long, env = "RPC_BURST", requires = "rate")]
        burst: Option<u32>,
    },

    /// Call a method and print the result as JSON
    Call {
        #[command(flatten)]
        endpoint: Endpoint,

        /// Method name, e.g. Calc.Add or calc/add
        method: String,

        /// Params as JSON, e.g. '{"A":1,"B":2}'
        params: Option<String>,

        /// Send as a notification (no id)
        #[arg(long)]
        notify: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            endpoint,
            rate,
            burst,
        } => serve(endpoint, rate.zip(burst)).await,
        Commands::Call {
            endpoint,
            method,
            params,
            notify,
        } => call(endpoint, &method, params.as_deref(), notify).await,
    }
}

async fn serve(endpoint: Endpoint, limit: Option<(f64, u32)>) -> anyhow::Result<()> {
    let mut server = RpcServer::new(endpoint.transport, endpoint.addr);
    server
        .register(rpc_cli::calc::service())
        .context("registering Calc")?;
    if let Some((rate, burst)) = limit {
        server.set_rate_limit(rate, burst);
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    };

    server
        .start_with_shutdown(shutdown)
        .await
        .with_context(|| format!("serving {} on {}", endpoint.transport, endpoint.addr))
}

async fn call(
    endpoint: Endpoint,
    method: &str,
    params: Option<&str>,
    notify: bool,
) -> anyhow::Result<()> {
    let params: Value = match params {
        Some(raw) => serde_json::from_str(raw).context("params must be valid JSON")?,
        None => Value::Null,
    };

    let mut client = RpcClient::connect(endpoint.transport, endpoint.addr)
        .await
        .with_context(|| format!("connecting to {} over {}", endpoint.addr, endpoint.transport))?;
    let result: Value = client.call(method, params, notify).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
