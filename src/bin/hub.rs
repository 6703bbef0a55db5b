use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use queue_monitoring::{
    actors::messages::SamplerEvent,
    config::{Config, read_config_file},
    sources::{ApiCounters, DisconnectedCache, MemoryQueue, Sources, SysinfoRuntime},
    system::MonitoringSystem,
    util::get_config_path,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $MONITOR_CONFIG or ./monitoring.json)
    #[arg(short)]
    file: Option<String>,
}

fn init(log_level: &str) {
    let level = LevelFilter::from_str(log_level).unwrap_or(LevelFilter::INFO);
    let filter = filter::Targets::new().with_targets(vec![
        ("queue_monitoring", level),
        ("queue_monitor_hub", level),
        ("tower_http", level),
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

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        read_config_file(path)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let path = args.file.clone().unwrap_or_else(get_config_path);
    let config = load_config(&path)?;
    init(&config.log_level);
    trace!("started with args: {args:?}");
    debug!("using config from {path}");

    let sources = build_sources(&config).await?;
    let system = MonitoringSystem::start(&config, sources);

    let breaches = tokio::spawn(log_breaches(system.clone()));

    system.subscribe_defaults(&config).await?;

    #[cfg(feature = "api")]
    serve_api(&config, &system).await?;

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");

    breaches.abort();
    system.shutdown().await?;

    Ok(())
}

async fn build_sources(config: &Config) -> anyhow::Result<Sources> {
    let api = Arc::new(ApiCounters::new(config.api_client.requests_per_second));
    let runtime = Arc::new(SysinfoRuntime::new()?);

    #[cfg(feature = "redis")]
    {
        if let Some(redis) = &config.redis {
            use queue_monitoring::sources::redis_store::{self, RedisCache, RedisQueue};
            use queue_monitoring::util::get_redis_url;

            let url = get_redis_url().unwrap_or_else(|| redis.url.clone());
            let conn = redis_store::connect(&url).await?;
            info!("using redis queue '{}' at {}", redis.queue, url);

            return Ok(Sources {
                queue: Arc::new(RedisQueue::new(conn.clone(), &redis.prefix, &redis.queue)),
                cache: Arc::new(RedisCache::new(conn)),
                api,
                runtime,
            });
        }
    }

    #[cfg(not(feature = "redis"))]
    {
        if config.redis.is_some() {
            warn!("redis section ignored, built without the redis feature");
        }
    }

    info!("no redis configured, using in-process queue state");
    Ok(Sources {
        queue: Arc::new(MemoryQueue::new()),
        cache: Arc::new(DisconnectedCache),
        api,
        runtime,
    })
}

#[cfg(feature = "api")]
async fn serve_api(config: &Config, system: &MonitoringSystem) -> anyhow::Result<()> {
    use queue_monitoring::api::{ApiState, spawn_api_server};
    use queue_monitoring::config::ServerConfig;
    use queue_monitoring::util::get_api_addr;
    use std::time::Duration;

    let server = match (get_api_addr(), &config.server) {
        (Some(bind_addr), server) => ServerConfig {
            bind_addr,
            enable_cors: server.as_ref().is_none_or(|s| s.enable_cors),
        },
        (None, Some(server)) => server.clone(),
        (None, None) => {
            debug!("no API server configured");
            return Ok(());
        }
    };

    let state = ApiState::new(
        system.clone(),
        Duration::from_millis(config.hub.job_poll_interval_ms),
    );
    spawn_api_server(&server, state).await?;

    Ok(())
}

#[instrument(skip_all)]
async fn log_breaches(system: MonitoringSystem) {
    let mut events = system.sampler.subscribe();

    loop {
        match events.recv().await {
            Ok(SamplerEvent::ThresholdBreach { timestamp, breaches }) => {
                for breach in breaches {
                    warn!("{timestamp}: {breach}");
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("breach logger lagged, skipped {skipped} events"),
            Err(RecvError::Closed) => {
                error!("sampler event channel closed");
                break;
            }
        }
    }
}
