use {
    request_desk::{
        AppState,
        adapters::{notifier::LogNotifier, stripe_client::StripeGateway},
        config::{AppConfig, LedgerBackend},
        domain::{gateway::CheckoutGateway, ledger::LedgerStore, notification::NotificationOutbox},
        infra::{memory::InMemoryLedger, postgres::PgLedger},
        services::worker,
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let (ledger, outbox): (Arc<dyn LedgerStore>, Arc<dyn NotificationOutbox>) =
        match config.backend {
            LedgerBackend::Postgres => {
                let database_url = config.database_url.as_deref().unwrap_or_default();
                let pool = PgPoolOptions::new()
                    .max_connections(20)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                let ledger = Arc::new(PgLedger::new(pool));
                (ledger.clone() as Arc<dyn LedgerStore>, ledger as Arc<dyn NotificationOutbox>)
            }
            LedgerBackend::Memory => {
                tracing::warn!("using in-memory ledger, state is lost on exit");
                let ledger = Arc::new(InMemoryLedger::new());
                (ledger.clone() as Arc<dyn LedgerStore>, ledger as Arc<dyn NotificationOutbox>)
            }
        };

    let gateway: Arc<dyn CheckoutGateway> = Arc::new(StripeGateway::new(
        &config.stripe_secret_key,
        config.gateway_timeout,
    ));

    let state = AppState {
        ledger: ledger.clone(),
        outbox: outbox.clone(),
        gateway: gateway.clone(),
        checkout: Arc::new(config.checkout.clone()),
        stripe_webhook_secret: config.stripe_webhook_secret.clone().into(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = [
        tokio::spawn(worker::run_notifier(
            outbox.clone(),
            Arc::new(LogNotifier),
            config.outbox_max_attempts,
            shutdown_rx.clone(),
        )),
        tokio::spawn(worker::run_reaper(outbox, shutdown_rx.clone())),
        tokio::spawn(worker::run_reconciler(
            ledger,
            gateway,
            config.checkout.currency,
            config.reconcile_after,
            shutdown_rx,
        )),
    ];

    let app = request_desk::router(state, config.http_timeout);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
