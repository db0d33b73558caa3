use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hapi")]
#[command(about = "hapi CLI: Zalo OA auto-responder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: HAPI_CONFIG_PATH or ~/.hapi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (health probe + Zalo webhook).
    Gateway {
        /// Config file path (default: HAPI_CONFIG_PATH or ~/.hapi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Answer a question with the configured backends and print it. Nothing is sent to Zalo.
    Ask {
        /// Config file path (default: HAPI_CONFIG_PATH or ~/.hapi/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Print the retrieved context before the reply.
        #[arg(long)]
        show_context: bool,

        /// The customer question.
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("hapi {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            show_context,
            message,
        }) => {
            if let Err(e) = run_ask(config, show_context, &message).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    show_context: bool,
    message: &str,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    lib::config::validate(&config)?;
    let responder = lib::pipeline::AutoResponder::from_config(&config).await;
    let answer = responder.answer(message).await?;
    if show_context {
        if answer.context.is_empty() {
            println!("(no context above threshold {})", config.retrieval.threshold);
        } else {
            println!("{}", answer.context.as_str());
        }
        println!("---");
    }
    println!("< {}", answer.text.trim());
    Ok(())
}
