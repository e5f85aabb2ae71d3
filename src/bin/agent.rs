use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use inventory_monitoring::{
    actors::{EndpointHandle, EndpointScheduling, InventoryEvent, MetricEvent},
    config::{Config, ProtocolKind, read_config_file},
    endpoint::{ConnectionData, EndpointService, MonitoredEndpoint},
    inventory::{Name, ResourceTypeManager},
    platform::PlatformCache,
    protocol::{
        ProtocolDiagnostics,
        model::{ModelDriverFactory, ModelPath, ModelPathResolver},
        objname::{LocalRegistry, ManagedRegistry, ObjectName, ObjectNameDriverFactory, ObjectNameResolver},
    },
    sync::{InventorySync, SyncSettings},
    util::{get_config_path, get_sync_url},
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("inventory_monitoring", LevelFilter::TRACE),
        ("inventory_agent", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file.unwrap_or_else(get_config_path))?;

    let handles = dispatch_endpoints(&config).await?;
    if handles.is_empty() {
        info!("no endpoints configured, nothing to monitor");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let results = join_all(handles.iter().map(|handle| handle.shutdown())).await;
    for (handle, result) in handles.iter().zip(results) {
        if let Err(e) = result {
            error!("{}: {e}", handle.endpoint_name);
        }
    }

    Ok(())
}

async fn dispatch_endpoints(config: &Config) -> anyhow::Result<Vec<EndpointHandle>> {
    let ignored: Option<HashSet<Name>> = if config.ignored_type_sets.is_empty() {
        None
    } else {
        Some(config.ignored_type_sets.iter().map(|name| Name::from(name.as_str())).collect())
    };

    let model_sets = inventory_monitoring::config::build_type_sets(&config.model_type_sets, |path| {
        match path {
            Some(path) => ModelPath::parse(path),
            None => Ok(ModelPath::empty()),
        }
    })?;
    let objname_sets = inventory_monitoring::config::build_type_sets(&config.objname_type_sets, |path| {
        match path {
            Some(path) => ObjectName::parse(path),
            None => Ok(ObjectName::unset()),
        }
    })?;

    let model_types = Arc::new(ResourceTypeManager::new(&model_sets, ignored.as_ref())?);
    let objname_types = Arc::new(ResourceTypeManager::new(&objname_sets, ignored.as_ref())?);
    debug!(
        "type graphs built: [{}] model types, [{}] object-name types",
        model_types.len(),
        objname_types.len()
    );

    // the agent's own machine is an attribute source for in-process endpoints
    let platform = Arc::new(PlatformCache::new());
    let registry = Arc::new(LocalRegistry::new());
    spawn_platform_refresher(platform.clone(), registry.clone());

    let scheduling = EndpointScheduling {
        discovery_interval: Duration::from_secs(config.discovery_interval),
        sample_interval: Duration::from_secs(config.sample_interval),
    };

    let sync_settings = sync_settings(config);

    let (model_event_tx, _) = broadcast::channel::<InventoryEvent<ModelPath>>(64);
    let (objname_event_tx, _) = broadcast::channel::<InventoryEvent<ObjectName>>(64);
    let (metric_tx, _) = broadcast::channel::<MetricEvent>(256);
    spawn_metric_logger(metric_tx.subscribe());

    let mut handles = Vec::new();
    for endpoint_config in config.endpoints.iter().flatten() {
        let connection = endpoint_config.url.clone().map(|url| ConnectionData {
            url,
            username: endpoint_config.username.clone(),
            password: endpoint_config.password.clone(),
        });
        let endpoint = MonitoredEndpoint::new(endpoint_config.name.clone(), connection);
        let diagnostics = ProtocolDiagnostics::new();
        let sync = sync_settings.clone().map(InventorySync::new);

        let handle = match endpoint_config.protocol {
            ProtocolKind::Model => {
                let factory = Arc::new(ModelDriverFactory::new(endpoint.clone(), diagnostics.clone()));
                let service = EndpointService::new(
                    endpoint,
                    factory,
                    model_types.clone(),
                    Arc::new(ModelPathResolver),
                    diagnostics,
                );
                EndpointHandle::spawn(service, sync, scheduling, model_event_tx.clone(), metric_tx.clone())
            }
            ProtocolKind::Objname => {
                let factory = Arc::new(ObjectNameDriverFactory::new(
                    endpoint.clone(),
                    Some(registry.clone() as Arc<dyn ManagedRegistry>),
                    diagnostics.clone(),
                ));
                let service = EndpointService::new(
                    endpoint,
                    factory,
                    objname_types.clone(),
                    Arc::new(ObjectNameResolver),
                    diagnostics,
                );
                EndpointHandle::spawn(service, sync, scheduling, objname_event_tx.clone(), metric_tx.clone())
            }
        };
        info!("monitoring endpoint [{}]", handle.endpoint_name);
        handles.push(handle);
    }

    Ok(handles)
}

fn sync_settings(config: &Config) -> Option<SyncSettings> {
    let sync_config = config.sync.as_ref();
    let url = sync_config.map(|sync| sync.url.clone()).or_else(get_sync_url)?;
    let mut settings = SyncSettings::new(url);
    if let Some(sync) = sync_config {
        settings.username = sync.username.clone();
        settings.password = sync.password.clone();
        settings.refresh_interval = chrono::Duration::hours(sync.refresh_hours as i64);
    }
    Some(settings)
}

fn spawn_platform_refresher(platform: Arc<PlatformCache>, registry: Arc<LocalRegistry>) {
    tokio::spawn(async move {
        loop {
            let refresh_target = platform.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || refresh_target.refresh()).await {
                error!("platform refresh task failed: {e}");
            }
            platform.publish(&registry);
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });
}

fn spawn_metric_logger(mut metric_rx: broadcast::Receiver<MetricEvent>) {
    tokio::spawn(async move {
        while let Ok(event) = metric_rx.recv().await {
            debug!("{}: collected [{}] samples", event.endpoint, event.samples.len());
        }
    });
}
