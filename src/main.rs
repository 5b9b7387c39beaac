//! rpclink - serve and call remote procedures over TCP

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rpclink::config::{self, Config};
use rpclink::network::{resolve_host, Client, Server, ServerEvent};
use rpclink::protocol::{self, DEFAULT_PORT};
use rpclink::rpc::{builtin_table, decode_values, encode_values, Value, ValueType};

/// rpclink - minimal binary RPC
#[derive(Parser)]
#[command(name = "rpclink")]
#[command(author = "rpclink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Serve and call remote procedures over a compact binary protocol", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the built-in procedures
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind to (overrides the config file)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Call a procedure on a server
    Call {
        /// Server as HOST or HOST:PORT
        server: String,

        /// Procedure name
        function: String,

        /// Arguments as TYPE:VALUE, e.g. u32:21 or str:hello
        args: Vec<Value>,

        /// Comma separated result types, e.g. u32 or str; empty for none
        #[arg(short, long, default_value = "")]
        returns: String,
    },

    /// List the built-in procedures
    Functions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Serve { port, bind } => {
            run_server(config, port, bind).await?;
        }
        Commands::Call {
            server,
            function,
            args,
            returns,
        } => {
            run_call(config, &server, &function, args, &returns).await?;
        }
        Commands::Functions { json } => {
            print_functions(json)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose || config.general.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match &config.general.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Could not open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

/// Run the server until Ctrl+C
async fn run_server(config: Config, port: Option<u16>, bind: Option<String>) -> anyhow::Result<()> {
    let mut net_config = config.network.to_network_config();
    if let Some(port) = port {
        net_config.port = port;
    }
    if let Some(bind) = bind {
        net_config.bind_address = bind;
    }

    let table = Arc::new(builtin_table());
    tracing::info!(
        "Starting rpclink server '{}' with {} procedures",
        config.general.name,
        table.len()
    );

    let mut server = Server::new(net_config, table.clone());
    let mut event_rx = server
        .take_event_receiver()
        .context("event receiver already taken")?;

    let local_addr = server.start().await?;

    println!("\n========================================");
    println!("  rpclink Server Running");
    println!("========================================");
    println!("  Host: {}", config.general.name);
    println!("  Listening: {}", local_addr);
    println!("  Procedures: {}", table.len());
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    // Main event loop
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ServerEvent::ClientConnected { session, addr } => {
                        println!("+ Client connected: {} [{}]", addr, session);
                    }
                    ServerEvent::ClientDisconnected { session, addr, summary, reason } => {
                        println!(
                            "- Client disconnected: {} [{}] after {} calls ({})",
                            addr, session, summary.completed, reason
                        );
                    }
                    ServerEvent::Error { message } => {
                        tracing::error!("Server error: {}", message);
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    server.stop().await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Run one call and print its result
async fn run_call(
    config: Config,
    server: &str,
    function: &str,
    args: Vec<Value>,
    returns: &str,
) -> anyhow::Result<()> {
    let returns = ValueType::parse_list(returns)?;
    let mut net_config = config.network.to_network_config();

    let host = match server.rsplit_once(':') {
        Some((host, port)) => {
            net_config.port = port
                .parse()
                .with_context(|| format!("Invalid port in {}", server))?;
            host
        }
        None => server,
    };
    let addr = resolve_host(host, net_config.port).await?;

    let (block, slots) = encode_values(&args);
    tracing::debug!("{}() argument slots: {:?}", function, slots);

    let mut client = Client::connect(addr, &net_config).await?;
    let result = client
        .call_raw(function, &block, !returns.is_empty())
        .await?;

    if let Some(block) = result {
        let values = decode_values(&returns, &block)
            .map_err(|e| anyhow::anyhow!("{}: bad result block: {}", function, e))?;
        for value in values {
            println!("{}", value);
        }
    }

    client.close().await?;
    Ok(())
}

/// Print the built-in table
fn print_functions(json: bool) -> anyhow::Result<()> {
    let infos = builtin_table().infos();
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("Procedures served by rpclink (port {}):\n", DEFAULT_PORT);
    for info in infos {
        let sizes = match info.header() {
            Some(header) => format!("{:?}", header.arg_sizes),
            None => "variable".to_string(),
        };
        println!(
            "  {} {}({})  slots: {}",
            info.returns,
            info.name,
            info.params.join(", "),
            sizes
        );
    }
    println!("\nBlocks larger than {} bytes are refused.", protocol::DEFAULT_MAX_BLOCK_SIZE);
    Ok(())
}
