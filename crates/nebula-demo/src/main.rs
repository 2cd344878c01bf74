//! Demo host for the Nebula client transport.
//!
//! `nebula-demo serve` runs a framed echo server. `nebula-demo client` drives a
//! `ConnectionManager` from a fixed-rate loop against it, with configuration
//! loaded from `config.ron` and overridable via CLI flags.
//!
//! Run with `cargo run -p nebula-demo -- serve` in one terminal and
//! `cargo run -p nebula-demo -- client --messages 5` in another.

mod client;
mod echo_server;

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use nebula_config::{CliArgs, Config};
use nebula_net::FrameConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nebula-demo", about = "Nebula client transport demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a length-prefixed echo server.
    Serve(ServeArgs),
    /// Connect, send messages, and wait for their echoes.
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:7777")]
    bind: SocketAddr,

    /// Largest frame payload accepted, in bytes.
    #[arg(long, default_value_t = nebula_net::framing::DEFAULT_MAX_PAYLOAD_SIZE)]
    max_frame_bytes: u32,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[command(flatten)]
    overrides: CliArgs,

    /// Number of request messages to send.
    #[arg(long, default_value_t = 10)]
    messages: u32,

    /// Tick rate of the update loop.
    #[arg(long, default_value_t = 60)]
    tick_hz: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Client(args) => run_client(args),
    }
}

fn serve(args: ServeArgs) -> ExitCode {
    nebula_log::init_logging(None, false, None);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let frame = FrameConfig {
        max_payload_size: args.max_frame_bytes,
    };
    match runtime.block_on(echo_server::run(args.bind, frame)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Echo server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_client(args: ClientArgs) -> ExitCode {
    // Resolve config directory
    let Some(config_dir) = args
        .overrides
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("nebula-engine")))
    else {
        eprintln!("Failed to resolve config directory; pass --config");
        return ExitCode::FAILURE;
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.overrides);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match client::run(&config.network, args.messages, args.tick_hz) {
        Ok(report) if report.all_echoed() => {
            info!("All {} echoes received", report.received);
            ExitCode::SUCCESS
        }
        Ok(report) => {
            error!(
                "Stopped after {}/{} echoes",
                report.received, report.expected
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Transport rejected the demo: {e}");
            ExitCode::FAILURE
        }
    }
}
