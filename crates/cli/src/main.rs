use {
    clap::{Parser, Subcommand},
    codequest_config::CodequestConfig,
    codequest_gateway::AppState,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "codequest", about = "CodeQuest — terminal gateway for the learning platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    // Gateway arguments (used when no subcommand is provided, or with `gateway`)
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Shell spawned inside PTY sessions (overrides $SHELL).
    #[arg(long, global = true, env = "CODEQUEST_SHELL")]
    shell: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Gateway,
    /// Validate a command line against the sandbox policy and exit.
    Validate {
        /// The command line to check.
        command: String,
    },
    /// List the commands the sandbox allows.
    Commands,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn gateway_config(cli: &Cli) -> CodequestConfig {
    let mut config = CodequestConfig::from_env();
    if let Some(bind) = &cli.bind {
        config.gateway.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(shell) = &cli.shell {
        config.gateway.shell = Some(shell.clone());
    }
    config
}

async fn run_gateway(cli: &Cli) -> anyhow::Result<()> {
    let state = AppState::new(gateway_config(cli));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting codequest gateway"
    );

    let sessions = std::sync::Arc::clone(&state.gateway);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        sessions.sessions.shutdown_all();
        // Give session handlers a moment to kill their PTYs.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        std::process::exit(0);
    });

    codequest_gateway::start_gateway(state).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn run_validate(command: &str) -> anyhow::Result<()> {
    let verdict = codequest_sandbox::validate(command);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    if verdict.allowed {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn run_commands() {
    for (name, description) in codequest_sandbox::available_commands() {
        println!("{name:<12} {description}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    match &cli.command {
        None | Some(Commands::Gateway) => run_gateway(&cli).await,
        Some(Commands::Validate { command }) => run_validate(command),
        Some(Commands::Commands) => {
            run_commands();
            Ok(())
        },
    }
}
