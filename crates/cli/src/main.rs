use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "linegpt")]
#[command(about = "Relay LINE messages to an OpenAI completion model", long_about = None)]
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
        /// Config file path (default: LINEGPT_CONFIG_PATH or ~/.linegpt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (LINE webhook, /info). Credentials come from config or LINE_* / OPENAI_* env.
    Gateway {
        /// Config file path (default: LINEGPT_CONFIG_PATH or ~/.linegpt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from APP_PORT, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one prompt to the configured completion model and print the reply.
    Ask {
        /// Config file path (default: LINEGPT_CONFIG_PATH or ~/.linegpt/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Prompt text
        prompt: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("linegpt {}", env!("CARGO_PKG_VERSION"));
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
        Some(Commands::Ask { config, prompt }) => {
            if let Err(e) = run_ask(config, &prompt).await {
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
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_ask(config_path: Option<std::path::PathBuf>, prompt: &str) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let api_key = config
        .openai
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("openai.apiKey (OPENAI_API_KEY) is not set"))?;
    let model = config
        .openai
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("openai.model (OPENAI_FINE_TUNED_MODEL_NAME) is not set"))?;
    let client = lib::llm::OpenAiClient::new(config.openai.base_url.clone(), api_key);
    let reply = client
        .complete(prompt, &model, config.openai.max_tokens)
        .await?;
    println!("{}", reply);
    Ok(())
}
