use clap::Parser;
use pkg_api::client::ApiClient;
use pkg_constants::network::DEFAULT_API_ADDR;
use pkg_constants::paths::{
    DEFAULT_CRICTL_BIN, DEFAULT_DETECTOR_CONFIG, DEFAULT_DOCKER_BIN, DEFAULT_DUMP_DIR,
};
use pkg_container::{RuntimeKind, inspector_for};
use pkg_dump::{DumpEvent, DumpOutcome, DumpPipeline, DumpStorage};
use pkg_types::config::{DetectorConfigFile, load_config_file};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Invoked by the kernel through `core_pattern`, e.g.
/// `|/usr/local/bin/coredump-detector -P %P -p %p -e %e -t %t`.
/// The dump arrives on stdin.
#[derive(Parser, Debug)]
#[command(
    name = "coredump-detector",
    about = "Attribute a crash dump to its pod and save it"
)]
#[command(version)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_DETECTOR_CONFIG)]
    config: String,

    /// PID of the dumping process in the initial PID namespace (%P)
    #[arg(short = 'P', long)]
    host_pid: u32,

    /// PID of the dumping process in its own PID namespace (%p)
    #[arg(short = 'p', long)]
    container_pid: u32,

    /// Executable filename (%e)
    #[arg(short = 'e', long)]
    filename: String,

    /// Time of the dump, seconds since the epoch (%t)
    #[arg(short = 't', long, allow_negative_numbers = true)]
    time: i64,

    /// API server endpoint
    #[arg(long)]
    server: Option<String>,

    /// Root directory for saved dumps
    #[arg(long)]
    dump_dir: Option<String>,

    /// Container runtime: docker or cri
    #[arg(long)]
    runtime: Option<String>,

    #[arg(long)]
    docker_bin: Option<String>,

    #[arg(long)]
    crictl_bin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // stdin carries the dump; keep stdout clean as well.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let file_cfg: DetectorConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let server = cli
        .server
        .or(file_cfg.server)
        .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
    let dump_dir = cli
        .dump_dir
        .or(file_cfg.dump_dir)
        .unwrap_or_else(|| DEFAULT_DUMP_DIR.to_string());
    let runtime: RuntimeKind = cli
        .runtime
        .or(file_cfg.runtime)
        .unwrap_or_else(|| "docker".to_string())
        .parse()?;
    let docker_bin = cli
        .docker_bin
        .or(file_cfg.docker_bin)
        .unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_string());
    let crictl_bin = cli
        .crictl_bin
        .or(file_cfg.crictl_bin)
        .unwrap_or_else(|| DEFAULT_CRICTL_BIN.to_string());

    let event = DumpEvent {
        host_pid: cli.host_pid,
        namespace_pid: cli.container_pid,
        filename: cli.filename,
        time: cli.time,
    };
    info!(
        "Dump of {} (pid {} / {}) at {}",
        event.filename, event.host_pid, event.namespace_pid, event.time
    );

    let client = Arc::new(ApiClient::new(&server)?);
    let pipeline = DumpPipeline::new(
        inspector_for(runtime, &docker_bin, &crictl_bin),
        client.clone(),
        client,
        DumpStorage::new(dump_dir),
    );

    let mut stdin = tokio::io::stdin();
    match pipeline.run(&event, &mut stdin).await {
        Ok(DumpOutcome::HostLevel { path }) => {
            info!("Saved host-level dump to {}", path.display());
        }
        Ok(DumpOutcome::Unattributed { path, reason }) => {
            info!("Saved unattributed dump to {} ({})", path.display(), reason);
        }
        Ok(DumpOutcome::Attributed { path, record }) => {
            info!(
                "Saved dump to {} as {}/{}",
                path.display(),
                record.namespace,
                record.name
            );
        }
        Err(e) => {
            error!("Dump of {} (pid {}) failed: {}", event.filename, event.host_pid, e);
            return Err(e.into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["coredump-detector", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_core_pattern_arguments() {
        let cli = Cli::try_parse_from([
            "coredump-detector",
            "-P",
            "4021",
            "-p",
            "7",
            "-e",
            "nginx",
            "-t",
            "1700000000",
        ])
        .unwrap();
        assert_eq!(cli.host_pid, 4021);
        assert_eq!(cli.container_pid, 7);
        assert_eq!(cli.filename, "nginx");
        assert_eq!(cli.time, 1700000000);
        assert!(cli.server.is_none());
    }
}
