use {
    crate::{
        domain::{
            error::ServiceError,
            gateway::CheckoutGateway,
            ledger::LedgerStore,
            money::Currency,
            notification::{NotificationOutbox, Notifier},
        },
        services::reconciler::sweep_unconfirmed,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

const CLAIM_BATCH: i64 = 10;
pub const SWEEP_BATCH: i64 = 50;

/// Poll the outbox and hand notifications to the notifier.
pub async fn run_notifier(
    outbox: Arc<dyn NotificationOutbox>,
    notifier: Arc<dyn Notifier>,
    max_attempts: i32,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("notification worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("notification worker shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        if let Err(e) = deliver_once(&*outbox, &*notifier, max_attempts).await {
            tracing::error!(error = %e, "notification poll error");
        }
    }
}

/// Claim one batch and try to deliver each job. Returns how many were delivered.
pub async fn deliver_once(
    outbox: &dyn NotificationOutbox,
    notifier: &dyn Notifier,
    max_attempts: i32,
) -> Result<usize, ServiceError> {
    let jobs = outbox.claim(CLAIM_BATCH).await?;
    let mut delivered = 0;

    for job in jobs {
        match notifier.deliver(&job.notification).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, kind = job.notification.kind(), "notification delivered");
                outbox.complete(job.id).await?;
                delivered += 1;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    attempts = job.attempts + 1,
                    error = %e,
                    "notification failed, scheduling retry"
                );
                outbox.fail(job.id, e.to_string(), max_attempts).await?;
            }
        }
    }

    Ok(delivered)
}

/// Periodically reset jobs stuck in 'processing' back to 'pending'.
pub async fn run_reaper(outbox: Arc<dyn NotificationOutbox>, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("stale job reaper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stale job reaper shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        }

        match outbox.reap_stale().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "reaped stale jobs"),
            Err(e) => tracing::error!(error = %e, "reaper error"),
        }
    }
}

/// Periodically replay confirmation for checkouts the payer never returned from.
pub async fn run_reconciler(
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn CheckoutGateway>,
    currency: Currency,
    reconcile_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("checkout reconciler started");
    let Ok(age) = chrono::Duration::from_std(reconcile_after) else {
        tracing::error!(?reconcile_after, "reconcile age out of range, reconciler disabled");
        return;
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("checkout reconciler shutting down");
                return;
            }
            _ = tokio::time::sleep(Duration::from_secs(300)) => {}
        }

        let older_than = chrono::Utc::now() - age;
        match sweep_unconfirmed(&*ledger, &*gateway, currency, older_than, SWEEP_BATCH).await {
            Ok(summary) if summary.checked == 0 && summary.purged == 0 => {}
            Ok(summary) => tracing::info!(
                checked = summary.checked,
                confirmed = summary.confirmed,
                expired = summary.expired,
                purged = summary.purged,
                failed = summary.failed,
                "reconciliation sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "reconciliation sweep error"),
        }
    }
}
