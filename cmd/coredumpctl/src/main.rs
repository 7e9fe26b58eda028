use clap::{Parser, Subcommand, ValueEnum};
use pkg_api::client::ApiClient;
use pkg_constants::network::DEFAULT_API_ADDR;
use pkg_constants::state::COREDUMPS_PREFIX;
use pkg_state::watch::EventType;
use pkg_types::Quantity;
use pkg_types::coredump::{Coredump, CoredumpState};
use pkg_types::pod::Pod;
use pkg_types::quota::CoredumpQuota;
use tracing::info;

#[derive(Parser)]
#[command(name = "coredumpctl", about = "CLI for coredump records and quotas")]
#[command(version)]
struct Cli {
    /// Server API endpoint
    #[arg(long, default_value = DEFAULT_API_ADDR)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage per-namespace coredump quotas
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
    /// Inspect and clean up coredump records
    Dump {
        #[command(subcommand)]
        action: DumpAction,
    },
    /// Register pods with the pod metadata service
    Pod {
        #[command(subcommand)]
        action: PodAction,
    },
    /// Stream store events
    Watch {
        /// Key prefix to follow
        #[arg(long, default_value = COREDUMPS_PREFIX)]
        prefix: String,
        /// Replay buffered events after this sequence number
        #[arg(long, default_value_t = 0)]
        seq: u64,
    },
}

#[derive(Subcommand)]
enum QuotaAction {
    /// Create a quota or change its hard limit
    Set {
        namespace: String,
        name: String,
        /// Hard limit, e.g. 10Gi
        #[arg(long)]
        hard: Quantity,
    },
    Get { namespace: String, name: String },
    List { namespace: String },
    Delete { namespace: String, name: String },
}

#[derive(Subcommand)]
enum DumpAction {
    /// List records, optionally in one namespace
    List {
        #[arg(long, short)]
        namespace: Option<String>,
    },
    Get { namespace: String, name: String },
    /// Delete a record; quota it held is released by the controller
    Delete { namespace: String, name: String },
    /// Report the outcome of saving an allowed dump
    Finish {
        namespace: String,
        name: String,
        #[arg(long, value_enum)]
        result: SaveResult,
        /// Volume the dump was saved to
        #[arg(long)]
        volume: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum PodAction {
    /// Create or replace a pod from a YAML file
    Put {
        #[arg(long, short)]
        file: String,
    },
    Get { namespace: String, name: String },
    Delete { namespace: String, name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SaveResult {
    Saved,
    Failed,
}

fn print_dumps(records: &[Coredump]) {
    println!(
        "{:<16} {:<48} {:<14} {:<10} {}",
        "NAMESPACE", "NAME", "STATE", "SIZE", "POD"
    );
    for record in records {
        println!(
            "{:<16} {:<48} {:<14} {:<10} {}",
            record.namespace,
            record.name,
            record.state().to_string(),
            record.spec.size.to_string(),
            record.spec.pod
        );
    }
    if records.is_empty() {
        println!("(no coredumps)");
    }
}

fn print_quotas(quotas: &[CoredumpQuota]) {
    println!("{:<16} {:<24} {:<10} {}", "NAMESPACE", "NAME", "USED", "HARD");
    for quota in quotas {
        println!(
            "{:<16} {:<24} {:<10} {}",
            quota.namespace,
            quota.name,
            quota.used().to_string(),
            quota.hard()
        );
    }
    if quotas.is_empty() {
        println!("(no quotas)");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::Quota { action } => match action {
            QuotaAction::Set {
                namespace,
                name,
                hard,
            } => {
                let quota = client
                    .put_quota(&CoredumpQuota::new(&namespace, &name, hard))
                    .await?;
                println!("coredumpquota {}/{} hard={}", quota.namespace, quota.name, quota.hard());
            }
            QuotaAction::Get { namespace, name } => {
                let quota = client.get_quota(&namespace, &name).await?;
                print!("{}", serde_yaml::to_string(&quota)?);
            }
            QuotaAction::List { namespace } => {
                print_quotas(&client.list_quotas(&namespace).await?);
            }
            QuotaAction::Delete { namespace, name } => {
                client.delete_quota(&namespace, &name).await?;
                println!("coredumpquota {}/{} deleted", namespace, name);
            }
        },
        Commands::Dump { action } => match action {
            DumpAction::List { namespace } => {
                info!("Querying coredumps from {}", cli.server);
                print_dumps(&client.list_coredumps(namespace.as_deref()).await?);
            }
            DumpAction::Get { namespace, name } => {
                let record = client.get_coredump(&namespace, &name).await?;
                print!("{}", serde_yaml::to_string(&record)?);
            }
            DumpAction::Delete { namespace, name } => {
                let record = client.delete_coredump(&namespace, &name).await?;
                println!(
                    "coredump {}/{} deleted (was {})",
                    namespace,
                    name,
                    record.state()
                );
            }
            DumpAction::Finish {
                namespace,
                name,
                result,
                volume,
                message,
            } => {
                let mut record = client.get_coredump(&namespace, &name).await?;
                record.status.state = match result {
                    SaveResult::Saved => CoredumpState::Saved,
                    SaveResult::Failed => CoredumpState::FailedToSave,
                };
                if let Some(message) = message {
                    record.status.message = message;
                }
                if let Some(volume) = volume {
                    record.spec.volume = volume;
                }
                let record = client.update_coredump_status(&record).await?;
                println!("coredump {}/{} is {}", namespace, name, record.state());
            }
        },
        Commands::Pod { action } => match action {
            PodAction::Put { file } => {
                let content = std::fs::read_to_string(&file)?;
                let pod: Pod = serde_yaml::from_str(&content)?;
                let pod = client.put_pod(&pod).await?;
                println!("pod {}/{} (uid={}) stored", pod.namespace, pod.name, pod.uid);
            }
            PodAction::Get { namespace, name } => {
                let pod = client.get_pod(&namespace, &name).await?;
                print!("{}", serde_yaml::to_string(&pod)?);
            }
            PodAction::Delete { namespace, name } => {
                client.delete_pod(&namespace, &name).await?;
                println!("pod {}/{} deleted", namespace, name);
            }
        },
        Commands::Watch { prefix, seq } => {
            client
                .watch(&prefix, seq, |event| {
                    let kind = match event.event_type {
                        EventType::Put => "PUT",
                        EventType::Delete => "DELETE",
                    };
                    let state = event
                        .value
                        .as_deref()
                        .and_then(|v| serde_json::from_slice::<Coredump>(v).ok())
                        .map(|r| format!(" {} {}", r.state(), r.spec.size))
                        .unwrap_or_default();
                    println!("{:>6} {:<6} {}{}", event.seq, kind, event.key, state);
                    true
                })
                .await?;
        }
    }

    Ok(())
}
