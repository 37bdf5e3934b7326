use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use storefront_api as api;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    info!(environment = %cfg.environment, "starting storefront-api");

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let tx_support = api::db::TransactionSupport::detect(&db_pool, cfg.transaction_mode)
        .await
        .context("transaction support check failed")?;
    if !tx_support.is_transactional() {
        warn!("order commits will run without a database transaction");
    }

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Outbound clients
    let adapters = api::payments::PaymentAdapters::from_config(&cfg)
        .context("failed to build payment adapters")?;
    let carrier: Arc<dyn api::shipping::CarrierClient> = Arc::new(
        api::shipping::HttpCarrierClient::from_config(&cfg)
            .context("failed to build courier client")?,
    );

    let db_arc = Arc::new(db_pool);
    let services = api::AppServices::new(
        db_arc.clone(),
        &cfg,
        tx_support,
        event_sender,
        adapters,
        carrier,
    );

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid listen address")?;

    let app_state = api::AppState {
        db: db_arc,
        config: Arc::new(cfg),
        tx_support,
        services,
    };

    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::api_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer);

    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => error!("failed to install signal handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
