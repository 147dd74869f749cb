//! Lattice flowcontrol - API Priority and Fairness bootstrap reconciler

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use futures::{future, StreamExt};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use k8s_openapi::api::flowcontrol::v1::{FlowSchema, PriorityLevelConfiguration};
use lattice_flowcontrol::{
    BootstrapConfiguration, BootstrapReconciler, ConfigurationKind, KindAccess,
    KubeConfigurationClient,
};

/// Keeps the built-in FlowSchemas and PriorityLevelConfigurations in place
#[derive(Parser, Debug)]
#[command(name = "lattice-flowcontrol", version, about, long_about = None)]
struct Cli {
    /// YAML file with the `mandatory` and `suggested` bootstrap sets
    #[arg(short = 'f', long = "bootstrap-file", env = "LATTICE_FLOWCONTROL_BOOTSTRAP")]
    bootstrap_file: PathBuf,

    /// Seconds between reconciliation passes
    #[arg(long, env = "LATTICE_FLOWCONTROL_INTERVAL", default_value = "60")]
    interval_secs: u64,

    /// Run a single pass and exit with its result
    #[arg(long)]
    once: bool,

    /// Remove defaults no longer shipped by this release
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    remove_dangling: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = BootstrapConfiguration::from_file(&cli.bootstrap_file).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load bootstrap configuration {:?}: {}",
            cli.bootstrap_file,
            e
        )
    })?;
    info!(
        file = ?cli.bootstrap_file,
        mandatory_priority_levels = config.mandatory().priority_levels().len(),
        mandatory_flow_schemas = config.mandatory().flow_schemas().len(),
        suggested_priority_levels = config.suggested().priority_levels().len(),
        suggested_flow_schemas = config.suggested().flow_schemas().len(),
        "Loaded bootstrap configuration"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let flow_schemas = cached_client::<FlowSchema>(&client).await?;
    let priority_levels = cached_client::<PriorityLevelConfiguration>(&client).await?;
    info!("Flowcontrol caches synced");

    let reconciler = BootstrapReconciler::new(
        KindAccess::<FlowSchema, _>::shared(flow_schemas),
        KindAccess::<PriorityLevelConfiguration, _>::shared(priority_levels),
    )
    .with_remove_dangling(cli.remove_dangling);

    if cli.once {
        reconciler.ensure_bootstrap_configuration(&config).await?;
        info!("Bootstrap configuration ensured");
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(cli.interval_secs.max(1)));
    loop {
        interval.tick().await;
        match reconciler.ensure_bootstrap_configuration(&config).await {
            Ok(()) => info!("Bootstrap configuration ensured"),
            Err(e) => warn!(
                error = %e,
                retryable = e.is_retryable(),
                "Failed to ensure bootstrap configuration, retrying next interval"
            ),
        }
    }
}

/// Start a reflector for `K` and return a client reading from its cache
///
/// Returns once the initial list has been loaded into the cache.
async fn cached_client<K: ConfigurationKind>(
    client: &Client,
) -> anyhow::Result<KubeConfigurationClient<K>> {
    let api: Api<K> = Api::all(client.clone());
    let (reader, writer) = reflector::store();

    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .for_each(|_| future::ready(()));
    tokio::spawn(stream);

    reader
        .wait_until_ready()
        .await
        .map_err(|e| anyhow::anyhow!("{} cache failed to sync: {}", K::TYPE_NAME, e))?;

    Ok(KubeConfigurationClient::new(client.clone(), reader))
}

