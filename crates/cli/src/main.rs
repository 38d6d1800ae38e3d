use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "marquee")]
#[command(about = "Marquee: LINE webhook relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: MARQUEE_CONFIG_PATH or ~/.marquee/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook server (GET / and POST /webhook). Requires a channel secret.
    Serve {
        /// Config file path (default: MARQUEE_CONFIG_PATH or ~/.marquee/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8090)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Fetch and print the upcoming-release digest once.
    Digest {
        /// Region code such as US, TW, CN (default US)
        region: Option<String>,

        /// Config file path (default: MARQUEE_CONFIG_PATH or ~/.marquee/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the X-Line-Signature for a request body read from FILE or stdin.
    Sign {
        /// Channel secret
        #[arg(long)]
        secret: String,

        /// Body file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Print recently stored messages for a sender.
    History {
        /// LINE user id
        #[arg(long)]
        user: String,

        /// Maximum number of rows (newest first)
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Print rows as a JSON array
        #[arg(long)]
        json: bool,

        /// Config file path (default: MARQUEE_CONFIG_PATH or ~/.marquee/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("marquee {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Serve { config, port }) => run_serve(config, port).await,
        Some(Commands::Digest { region, config }) => run_digest(region, config).await,
        Some(Commands::Sign { secret, file }) => run_sign(&secret, file),
        Some(Commands::History {
            user,
            limit,
            json,
            config,
        }) => run_history(&user, limit, json, config).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(marquee::config::default_config_path);
    let dir = marquee::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = marquee::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!("starting webhook server on {}:{}", config.server.bind, config.server.port);
    marquee::webhook::run_server(config, path).await
}

async fn run_digest(region: Option<String>, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = marquee::config::load_config(config_path)?;
    let region = marquee::releases::normalize_region(region.as_deref());
    let client =
        marquee::releases::DigestClient::new(&config.digest, &config.triggers.digest_command)?;
    println!("{}", client.fetch(&region).await);
    Ok(())
}

fn run_sign(secret: &str, file: Option<PathBuf>) -> anyhow::Result<()> {
    let body = match file {
        Some(p) => std::fs::read(&p).with_context(|| format!("reading {}", p.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    println!("{}", marquee::webhook::sign(secret.as_bytes(), &body)?);
    Ok(())
}

async fn run_history(
    user: &str,
    limit: usize,
    json: bool,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (config, path) = marquee::config::load_config(config_path)?;
    let db_path = marquee::config::resolve_database_path(&config, &path);
    let store = marquee::store::DialogueStore::open(
        &db_path,
        marquee::store::PoolOptions::from(&config.database),
    )?;
    let rows = store.recent_for_user(user, limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no messages stored for {}", user);
    }
    for row in rows {
        let group = if row.group_id.is_empty() {
            "-"
        } else {
            row.group_id.as_str()
        };
        println!("{}\t{}\t{}", row.date, group, row.message);
    }
    Ok(())
}
