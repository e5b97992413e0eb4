use browser_shell::config::{self, Config};
use browser_shell::gateway::{self, Dispatcher};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "browser-shell")]
#[command(about = "Policy-enforced gateway for a headless-browser CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Serve JSON-RPC over stdin/stdout, one JSON document per line.
    Stdio {
        /// Config file path (default: BROWSER_SHELL_CONFIG_PATH or ~/.browser-shell/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Egress policy document (default: BROWSER_SHELL_POLICY_PATH or policy.path from config)
        #[arg(long, value_name = "PATH")]
        policy: Option<PathBuf>,
    },

    /// Serve JSON-RPC over HTTP: POST /mcp/messages, responses on GET /sse.
    Serve {
        /// Config file path (default: BROWSER_SHELL_CONFIG_PATH or ~/.browser-shell/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Egress policy document (default: BROWSER_SHELL_POLICY_PATH or policy.path from config)
        #[arg(long, value_name = "PATH")]
        policy: Option<PathBuf>,

        /// Bind address (default from config or 127.0.0.1)
        #[arg(long, short, value_name = "ADDR")]
        bind: Option<String>,

        /// HTTP port (default from config or 8079)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // stderr only: stdout carries protocol lines in stdio mode.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("browser-shell {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Stdio { config, policy }) => {
            if let Err(e) = run_stdio(config, policy).await {
                log::error!("stdio transport failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve {
            config,
            policy,
            bind,
            port,
        }) => {
            if let Err(e) = run_serve(config, policy, bind, port).await {
                log::error!("http transport failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Load config and pick the policy path: flag, then env, then config file.
fn load(
    config_path: Option<PathBuf>,
    policy: Option<PathBuf>,
) -> anyhow::Result<(Config, PathBuf)> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("config: {}", path.display());
    let policy_path = policy.unwrap_or_else(|| config::resolve_policy_path(&config));
    log::debug!("egress policy: {}", policy_path.display());
    Ok((config, policy_path))
}

async fn run_stdio(config_path: Option<PathBuf>, policy: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, policy_path) = load(config_path, policy)?;
    let dispatcher = Dispatcher::from_config(&config, policy_path);
    gateway::run_stdio(tokio::io::stdin(), tokio::io::stdout(), dispatcher).await?;
    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    policy: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, policy_path) = load(config_path, policy)?;
    if let Some(b) = bind {
        config.gateway.bind = b;
    }
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    gateway::run_http(&config, policy_path).await
}
