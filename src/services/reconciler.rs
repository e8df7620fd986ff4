use {
    crate::domain::{
        actor::Actor,
        error::ServiceError,
        gateway::{CheckoutGateway, META_PAYMENT_ID, META_REQUEST_ID, RetrievedSession, SessionStatus},
        id::{PaymentId, SessionRef},
        ledger::LedgerStore,
        money::Currency,
        payment::{ConfirmOutcome, ConfirmationResult},
    },
    chrono::{DateTime, Utc},
};

pub const MSG_ALREADY_CONFIRMED: &str = "Payment already confirmed.";
pub const MSG_CONFIRMED: &str = "Payment confirmed and status updated.";
pub const MSG_MISSING_PAYMENT_ID: &str =
    "Checkout metadata missing or invalid paymentId. Cannot complete confirmation.";

/// Confirm the local payment behind a completed checkout session.
///
/// Safe to call any number of times for the same session: only the first
/// call that finds the payment unconfirmed writes anything. Incomplete
/// sessions and unusable metadata come back as `success: false` results,
/// not errors.
#[tracing::instrument(
    name = "confirm_session",
    skip_all,
    fields(session = %session_ref, actor = %actor, payment_id = tracing::field::Empty)
)]
pub async fn confirm_session(
    ledger: &dyn LedgerStore,
    gateway: &dyn CheckoutGateway,
    default_currency: Currency,
    actor: &Actor,
    session_ref: &SessionRef,
) -> Result<ConfirmationResult, ServiceError> {
    let session = gateway.retrieve_session(session_ref).await?;
    confirm_retrieved(ledger, default_currency, actor, &session).await
}

/// Confirmation for a session the caller already fetched from the gateway.
async fn confirm_retrieved(
    ledger: &dyn LedgerStore,
    default_currency: Currency,
    actor: &Actor,
    session: &RetrievedSession,
) -> Result<ConfirmationResult, ServiceError> {
    let session_ref = &session.reference;

    if !session.is_complete() {
        tracing::warn!(
            status = session.status.as_str(),
            payment_status = %session.payment_status,
            "checkout session not complete"
        );
        return Ok(ConfirmationResult::unconfirmed(format!(
            "Checkout payment status is {}. Cannot confirm payment.",
            session.payment_status
        )));
    }

    let Some(payment_id) = session
        .meta(META_PAYMENT_ID)
        .and_then(|raw| raw.parse::<PaymentId>().ok())
    else {
        tracing::warn!("{MSG_MISSING_PAYMENT_ID}");
        return Ok(ConfirmationResult::unconfirmed(MSG_MISSING_PAYMENT_ID));
    };
    tracing::Span::current().record("payment_id", tracing::field::display(payment_id));

    let Some(payment) = ledger.get_payment(payment_id).await? else {
        tracing::error!("session references a payment that does not exist locally");
        return Err(ServiceError::NotFound(format!(
            "payment not found with id: {payment_id}"
        )));
    };

    if let Some(claimed) = session.meta(META_REQUEST_ID) {
        if claimed != payment.request_id.as_str() {
            tracing::error!(
                claimed,
                local = %payment.request_id,
                "session metadata names a different request, using the local one"
            );
        }
    }

    let currency = session
        .currency
        .as_deref()
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| default_currency.code());

    if payment.is_confirmed() {
        tracing::info!("payment already confirmed, nothing to do");
        return Ok(ConfirmationResult::confirmed(
            &payment,
            currency,
            MSG_ALREADY_CONFIRMED,
        ));
    }

    match ledger.confirm_payment(payment_id, session_ref, actor).await? {
        ConfirmOutcome::Confirmed(payment) => {
            tracing::info!(
                request_id = %payment.request_id,
                "payment confirmed, request moved to payment_received"
            );
            Ok(ConfirmationResult::confirmed(&payment, currency, MSG_CONFIRMED))
        }
        ConfirmOutcome::AlreadyConfirmed(payment) => {
            tracing::info!("lost confirmation race, payment already confirmed");
            Ok(ConfirmationResult::confirmed(
                &payment,
                currency,
                MSG_ALREADY_CONFIRMED,
            ))
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    /// Payments this sweep moved to confirmed.
    pub confirmed: usize,
    /// Sessions found expired and taken out of future sweeps.
    pub expired: usize,
    /// Rows without a checkout session removed as dead initiations.
    pub purged: u64,
    pub failed: usize,
}

/// Replay confirmation for provisional payments whose checkout started
/// before `older_than`. Covers payers who completed checkout but never
/// came back to the redirect target.
///
/// Expired sessions are marked so they stop occupying the batch, and
/// provisional rows that never got a session are purged.
pub async fn sweep_unconfirmed(
    ledger: &dyn LedgerStore,
    gateway: &dyn CheckoutGateway,
    default_currency: Currency,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<SweepSummary, ServiceError> {
    let actor = Actor::system("worker:reconciler");
    let mut summary = SweepSummary {
        purged: ledger.purge_stalled_payments(older_than, &actor).await?,
        ..SweepSummary::default()
    };

    for payment in ledger.list_unconfirmed_checkouts(older_than, limit).await? {
        let Some(reference) = payment.checkout_reference else {
            continue;
        };
        summary.checked += 1;

        let session = match gateway.retrieve_session(&reference).await {
            Ok(session) => session,
            Err(e) => {
                summary.failed += 1;
                tracing::error!(payment_id = %payment.id, error = %e, "sweep could not fetch session");
                continue;
            }
        };

        if session.status == SessionStatus::Expired {
            match ledger.mark_checkout_expired(payment.id).await {
                Ok(()) => summary.expired += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(payment_id = %payment.id, error = %e, "could not mark checkout expired");
                }
            }
            continue;
        }

        match confirm_retrieved(ledger, default_currency, &actor, &session).await {
            Ok(result) if result.message == MSG_CONFIRMED => summary.confirmed += 1,
            Ok(_) => {}
            Err(e) => {
                summary.failed += 1;
                tracing::error!(payment_id = %payment.id, error = %e, "sweep confirmation failed");
            }
        }
    }

    Ok(summary)
}
