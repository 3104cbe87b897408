//! Process wiring.
//!
//! `bootstrap` opens every backend once and builds the `Context` handed to
//! the transports. Nothing here is global: tests build their own `Services`
//! against a temporary directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sled::Db;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Settings;
use crate::durable::{ConsumerLoop, LogHandler, Reconciler, SledLog, SledLogConsumer, Validator};
use crate::hub::{BroadcastPolicy, Hub, HubHandle, spawn_hub};
use crate::persistence::{MemoryCache, SledStore, open_db};
use crate::pipeline::IngestPipeline;
use crate::transport::{start_http_server, start_websocket_server};
use crate::utils::Result;

/// Dependencies shared by every request handler and session.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub hub: HubHandle,
    pub pipeline: IngestPipeline,
}

/// Everything `bootstrap` opened. Owns the backends for the process lifetime.
pub struct Services {
    pub ctx: Context,
    pub store: Arc<SledStore>,
    pub cache: Arc<MemoryCache>,
    pub log: SledLog,
    db: Db,
    hub_task: JoinHandle<()>,
}

pub async fn bootstrap(settings: Settings) -> Result<Services> {
    let db = open_db(
        Path::new(&settings.store.data_dir),
        settings.store.bootstrap_attempts,
        Duration::from_millis(settings.store.bootstrap_delay_ms),
    )
    .await?;

    let store = Arc::new(SledStore::new(&db)?);
    let cache = Arc::new(MemoryCache::new());
    let log = SledLog::open(&db, &settings.log.topic)?;

    let policy = BroadcastPolicy::from_exclude_sender(settings.hub.exclude_sender);
    let (hub, hub_task) = spawn_hub(Hub::new(policy));

    let pipeline = IngestPipeline::new(
        store.clone(),
        cache.clone(),
        Arc::new(log.clone()),
        Duration::from_secs(settings.cache.ttl_secs),
        settings.cache.key_prefix.clone(),
        settings.log.partition_key.clone(),
    );

    Ok(Services {
        ctx: Context {
            settings: Arc::new(settings),
            hub,
            pipeline,
        },
        store,
        cache,
        log,
        db,
        hub_task,
    })
}

impl Services {
    /// Builds the single consumer loop for the configured group.
    pub fn consumer_loop(&self) -> Result<ConsumerLoop<SledLogConsumer>> {
        let settings = &self.ctx.settings;
        let consumer = self.log.consumer(
            &settings.log.group,
            Duration::from_millis(settings.log.poll_interval_ms),
        )?;

        let handler: Arc<dyn LogHandler> = if settings.consumer.reconcile {
            Arc::new(Reconciler::new(
                self.store.clone(),
                self.cache.clone(),
                Duration::from_secs(settings.cache.ttl_secs),
                settings.cache.key_prefix.clone(),
            ))
        } else {
            Arc::new(Validator)
        };

        Ok(ConsumerLoop::new(
            consumer,
            handler,
            Duration::from_millis(settings.consumer.retry_backoff_ms),
        ))
    }

    /// Stops the hub and flushes the database.
    pub async fn shutdown(self) -> Result<()> {
        let Services { ctx, db, hub_task, .. } = self;
        drop(ctx);
        hub_task.abort();
        db.flush_async().await?;
        info!("storage flushed");
        Ok(())
    }
}

/// Runs both listeners, the hub and the consumer loop until Ctrl-C. A
/// failing consumer fetch ends the server with an error.
pub async fn run_server(settings: Settings) -> Result<()> {
    let ws_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let http_addr = format!("{}:{}", settings.http.host, settings.http.port);

    let services = bootstrap(settings).await?;
    let consumer = services.consumer_loop()?;
    let ctx = services.ctx.clone();

    let result = tokio::select! {
        r = start_websocket_server(&ws_addr, ctx.clone()) => {
            error!("WebSocket server exited unexpectedly.");
            r
        }
        r = start_http_server(&http_addr, ctx) => {
            error!("HTTP server exited unexpectedly.");
            r
        }
        r = consumer.run() => {
            error!("log consumer stopped.");
            r
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    services.shutdown().await?;
    result
}
