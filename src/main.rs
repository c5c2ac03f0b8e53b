//! calc-relay entry point.
//!
//! ## Subcommands
//!
//! - `calc-relay serve` - run the compute server
//! - `calc-relay proxy` - run the caching proxy in front of a server
//! - `calc-relay client` - send one request, or start the interactive loop
//!
//! Settings come from `CALC_RELAY_*` environment variables (a `.env` file is
//! loaded first); flags override them.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;

use calc_relay::cli::{self, RelayClient, DEFAULT_CLIENT_TIMEOUT};
use calc_relay::config::{self, Endpoint, EnvConfig};
use calc_relay::protocol::Mode;
use calc_relay::proxy::{self, ProxyHandler, UpstreamConfig};
use calc_relay::server::{self, ComputeHandler};
use calc_relay::shutdown::{ShutdownCoordinator, ShutdownResult};
use calc_relay::{completion, telemetry};

#[derive(Parser, Debug)]
#[command(name = "calc-relay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the compute server
    Serve(ServeArgs),
    /// Run the caching proxy
    Proxy(ProxyArgs),
    /// Send a request to a server or proxy
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    cache_size: Option<usize>,
}

#[derive(Args, Debug)]
struct ProxyArgs {
    #[arg(long)]
    listen_host: Option<String>,

    #[arg(long)]
    listen_port: Option<u16>,

    /// Compute server host
    #[arg(long)]
    server_host: Option<String>,

    /// Compute server port
    #[arg(long)]
    server_port: Option<u16>,

    #[arg(long)]
    cache_size: Option<usize>,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Omit to enter interactive mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Expression for --mode calc
    #[arg(long)]
    expr: Option<String>,

    /// Prompt for --mode gpt
    #[arg(long)]
    prompt: Option<String>,

    /// Ask server and proxy to bypass their caches
    #[arg(long)]
    no_cache: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Calc,
    Gpt,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Calc => Mode::Calc,
            ModeArg::Gpt => Mode::Gpt,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let env = config::load();

    if let Err(e) = telemetry::init_logging(&env.log) {
        eprintln!("Logging setup failed: {}", e);
    }

    let result = match cli.command {
        Command::Serve(args) => run_server(env, args).await,
        Command::Proxy(args) => run_proxy(env, args).await,
        Command::Client(args) => return run_client(env, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(env: EnvConfig, args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::new(
        args.host.unwrap_or(env.server.host),
        args.port.unwrap_or(env.server.port),
    );
    let listener = TcpListener::bind(endpoint.resolve().await?).await?;

    let completion = completion::from_config(&env.completion);
    let handler = Arc::new(ComputeHandler::new(
        args.cache_size.unwrap_or(env.cache_size),
        completion,
    ));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let serving = server::serve(listener, handler, env.listener, shutdown.clone());
    run_until_signal(serving, &shutdown, env.shutdown_timeout).await
}

async fn run_proxy(env: EnvConfig, args: ProxyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen = Endpoint::new(
        args.listen_host.unwrap_or(env.proxy.listen.host),
        args.listen_port.unwrap_or(env.proxy.listen.port),
    );
    let upstream = Endpoint::new(
        args.server_host.unwrap_or(env.proxy.upstream.host),
        args.server_port.unwrap_or(env.proxy.upstream.port),
    );
    let listener = TcpListener::bind(listen.resolve().await?).await?;

    let upstream = UpstreamConfig {
        addr: upstream.resolve().await?,
        connect_timeout: env.proxy.connect_timeout,
        read_timeout: env.proxy.read_timeout,
        max_frame_bytes: env.listener.max_frame_bytes,
    };
    tracing::info!(upstream = %upstream.addr, "proxy forwarding");
    let handler = Arc::new(ProxyHandler::new(
        args.cache_size.unwrap_or(env.cache_size),
        upstream,
    ));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let serving = proxy::serve(listener, handler, env.listener, shutdown.clone());
    run_until_signal(serving, &shutdown, env.shutdown_timeout).await
}

/// Drive `serving` until Ctrl-C, then stop accepting and drain connections.
async fn run_until_signal<F>(
    serving: F,
    shutdown: &ShutdownCoordinator,
    drain_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server_handle = tokio::spawn(serving);

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutdown signal received, draining...");

    match shutdown.drain(drain_timeout).await {
        ShutdownResult::Complete => eprintln!("Shutdown complete"),
        ShutdownResult::Timeout { remaining } => {
            eprintln!("Shutdown timeout, {} connections remaining", remaining);
        }
    }

    server_handle.await?;
    Ok(())
}

async fn run_client(env: EnvConfig, args: ClientArgs) -> ExitCode {
    let endpoint = Endpoint::new(
        args.host.unwrap_or(env.server.host),
        args.port.unwrap_or(env.server.port),
    );

    let Some(mode) = args.mode.map(Mode::from) else {
        return run_interactive(&endpoint).await;
    };

    let text = match mode {
        Mode::Calc => args.expr,
        Mode::Gpt => args.prompt,
    };
    let Some(text) = text.filter(|text| !text.is_empty()) else {
        eprintln!("Missing --{}", mode.payload_field());
        return ExitCode::from(2);
    };

    let request = cli::build_request(mode, &text, !args.no_cache);
    let response = match RelayClient::connect(&endpoint, DEFAULT_CLIENT_TIMEOUT).await {
        Ok(mut client) => client.request(&request).await,
        Err(e) => Err(e),
    };

    match response.and_then(|value| Ok(serde_json::to_string_pretty(&value)?)) {
        Ok(pretty) => {
            println!("{}", pretty);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_interactive(endpoint: &Endpoint) -> ExitCode {
    let client = match RelayClient::connect(endpoint, DEFAULT_CLIENT_TIMEOUT).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut client = client.with_request_timeout(None);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    match cli::interactive(&mut client, stdin, tokio::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
