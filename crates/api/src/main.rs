//! API server entry point.
//!
//! Serves HTTP and, in the same process, runs the delivery consumer and the
//! reconciliation sweep. With `DATABASE_URL` set the catalog and the task
//! queue live in PostgreSQL; without it everything stays in memory.

use std::sync::Arc;

use api::config::Config;
use catalog::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore};
use fulfillment::{
    FileDocumentRenderer, FulfillmentWorker, HttpMailNotifier, InMemoryTaskQueue, LoggingNotifier,
    Notifier, PostgresTaskQueue, Reconciler, TaskConsumer, TaskQueue,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresCatalogStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL catalog store and task queue");
            serve(config, metrics_handle, store, PostgresTaskQueue::new(pool)).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store and queue");
            serve(
                config,
                metrics_handle,
                InMemoryCatalogStore::new(),
                InMemoryTaskQueue::new(),
            )
            .await;
        }
    }
}

/// Runs the server, consumer and sweep until a shutdown signal arrives.
async fn serve<S, Q>(config: Config, metrics_handle: PrometheusHandle, store: S, queue: Q)
where
    S: CatalogStore + Clone + 'static,
    Q: TaskQueue + Clone + 'static,
{
    let notifier: Arc<dyn Notifier> = match config.mail_relay_url.as_deref() {
        Some(endpoint) => Arc::new(
            HttpMailNotifier::new(endpoint, config.mail_from.clone())
                .expect("failed to build mail relay client"),
        ),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, order messages will only be logged");
            Arc::new(LoggingNotifier)
        }
    };
    let renderer = FileDocumentRenderer::new(config.document_root.clone());

    let worker = FulfillmentWorker::new(
        store.clone(),
        renderer,
        notifier,
        config.worker_config(),
    );
    let consumer = TaskConsumer::new(queue.clone(), worker, config.consumer_config());
    let reconciler = Reconciler::new(
        store.clone(),
        queue.clone(),
        config.task_options(),
        config.sweep_stale_after,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx.clone()));
    let reconciler_handle = tokio::spawn(reconciler.run(config.sweep_interval, shutdown_rx));

    let state = Arc::new(api::AppState::new(store, queue, config.task_options()));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // In-flight deliveries finish before the process exits.
    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_handle.await {
        tracing::error!(error = %e, "task consumer panicked");
    }
    if let Err(e) = reconciler_handle.await {
        tracing::error!(error = %e, "reconciler panicked");
    }

    tracing::info!("server shut down gracefully");
}
