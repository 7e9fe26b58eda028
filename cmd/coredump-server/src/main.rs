use clap::Parser;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::controller::{DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_RESYNC_INTERVAL_SECS};
use pkg_constants::network::DEFAULT_API_PORT;
use pkg_constants::paths::{DEFAULT_SERVER_CONFIG, DEFAULT_SERVER_DATA_DIR};
use pkg_types::config::{ServerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "coredump-server",
    about = "Coredump record store and quota controller"
)]
#[command(version)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Seconds between quota resync passes
    #[arg(long)]
    resync_interval_secs: Option<u64>,

    /// Retries of a quota write after a version conflict
    #[arg(long)]
    max_conflict_retries: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_API_PORT);
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_SERVER_DATA_DIR.to_string());
    let resync_secs = cli
        .resync_interval_secs
        .or(file_cfg.resync_interval_secs)
        .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS)
        .max(1);
    let max_conflict_retries = cli
        .max_conflict_retries
        .or(file_cfg.max_conflict_retries)
        .unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES);

    info!("Starting coredump-server");
    info!("  Port:      {}", port);
    info!("  Data dir:  {}", data_dir);
    info!("  Resync:    {}s", resync_secs);
    info!("  Retries:   {}", max_conflict_retries);

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        data_dir,
        resync_interval: Duration::from_secs(resync_secs),
        max_conflict_retries,
    };

    start_server(config).await?;

    Ok(())
}
