use {
    crate::domain::{
        actor::Actor,
        error::ServiceError,
        gateway::{
            CheckoutGateway, CheckoutSessionRequest, META_CUSTOMER_EMAIL, META_PAYMENT_ID,
            META_REQUEST_ID,
        },
        id::{IdempotencyKey, RequestId},
        ledger::LedgerStore,
        money::{Amount, Currency},
        payment::{CheckoutReference, NewPayment, NewPaymentParams, Payment, PaymentInsert},
        request::validate_email,
    },
    rust_decimal::Decimal,
    std::{collections::BTreeMap, sync::Arc},
    tracing::Instrument,
};

/// Placeholder in the cancel URL replaced with the request id.
pub const REQUEST_ID_PLACEHOLDER: &str = "{REQUEST_ID}";

/// Where the hosted checkout page sends the payer back to.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Stripe substitutes `{CHECKOUT_SESSION_ID}` itself.
    pub success_url: String,
    pub cancel_url: String,
    pub currency: Currency,
}

/// Caller input for one checkout attempt.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub amount: Decimal,
    pub email: String,
    pub idempotency_key: IdempotencyKey,
}

/// Create a provisional payment and open a checkout session for it.
///
/// The payment row is written first and removed again if the gateway call
/// fails. Retrying with the same idempotency key returns the reference of
/// the first successful call.
#[tracing::instrument(
    name = "initiate_payment",
    skip_all,
    fields(request_id = %request_id, actor = %actor, payment_id = tracing::field::Empty)
)]
pub async fn initiate_payment(
    ledger: &dyn LedgerStore,
    gateway: &dyn CheckoutGateway,
    settings: &CheckoutSettings,
    actor: &Actor,
    request_id: &RequestId,
    intent: PaymentIntent,
) -> Result<CheckoutReference, ServiceError> {
    let amount = Amount::new(intent.amount)?;
    let email = validate_email(&intent.email)?;

    let request = ledger.get_request(request_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!("service request not found with id: {request_id}"))
    })?;
    let price = request.payable_price()?;

    let new_payment = NewPayment::new(NewPaymentParams {
        request_id: request.id.clone(),
        amount,
        price,
        currency: settings.currency,
        email,
        idempotency_key: intent.idempotency_key,
    });

    let payment = match ledger.insert_payment(&new_payment, actor).await? {
        PaymentInsert::Created(payment) => payment,
        PaymentInsert::Existing(existing) => return replay(gateway, existing, &new_payment).await,
    };
    tracing::Span::current().record("payment_id", tracing::field::display(payment.id));
    tracing::info!(status = %payment.state, amount = %payment.amount, "payment row created");

    let session_request = CheckoutSessionRequest {
        amount: payment.amount.to_minor_units()?,
        currency: payment.currency,
        payer_email: payment.email.clone(),
        success_url: settings.success_url.clone(),
        cancel_url: settings
            .cancel_url
            .replace(REQUEST_ID_PLACEHOLDER, request.id.as_str()),
        product_name: request.title.clone(),
        product_description: format!("Service Request ID: {}", request.id),
        metadata: BTreeMap::from([
            (META_REQUEST_ID.to_string(), request.id.to_string()),
            (META_PAYMENT_ID.to_string(), payment.id.to_string()),
            (META_CUSTOMER_EMAIL.to_string(), payment.email.clone()),
        ]),
        idempotency_key: payment.gateway_idempotency_key(),
    };

    let session = match gateway.create_session(session_request).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "checkout session creation failed, rolling back payment");
            match ledger.delete_payment(payment.id, actor).await {
                Ok(true) => {}
                Ok(false) => tracing::error!("payment row missing during rollback"),
                Err(rollback) => {
                    tracing::error!(error = %rollback, "payment rollback failed, row left behind")
                }
            }
            return Err(match e {
                ServiceError::ExternalService(msg) => ServiceError::ExternalService(msg),
                other => ServiceError::ExternalService(other.to_string()),
            });
        }
    };

    ledger
        .record_checkout_reference(payment.id, &session.reference)
        .await?;
    tracing::info!(session = %session.reference, "checkout session created");

    Ok(CheckoutReference {
        payment_id: payment.id,
        session_reference: session.reference,
        checkout_url: session.url,
        status: payment.status(),
        replayed: false,
    })
}

/// Run [`initiate_payment`] on its own task. The row insert, gateway call
/// and compensating delete then finish even if the caller is dropped
/// (client disconnect, request timeout), so no half-initiated row is left
/// behind for later retries to trip over.
pub async fn initiate_payment_detached(
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn CheckoutGateway>,
    settings: Arc<CheckoutSettings>,
    actor: Actor,
    request_id: RequestId,
    intent: PaymentIntent,
) -> Result<CheckoutReference, ServiceError> {
    let task = tokio::spawn(
        async move {
            initiate_payment(&*ledger, &*gateway, &settings, &actor, &request_id, intent).await
        }
        .in_current_span(),
    );
    task.await
        .map_err(|e| ServiceError::Internal(format!("payment initiation task failed: {e}")))?
}

async fn replay(
    gateway: &dyn CheckoutGateway,
    existing: Payment,
    attempted: &NewPayment,
) -> Result<CheckoutReference, ServiceError> {
    if !existing.matches_intent(attempted.amount(), attempted.email()) {
        return Err(ServiceError::Conflict(format!(
            "idempotency key {} was already used with a different amount or email",
            attempted.idempotency_key()
        )));
    }
    let Some(reference) = existing.checkout_reference.clone() else {
        return Err(ServiceError::Conflict(format!(
            "payment {} for this idempotency key is still being set up",
            existing.id
        )));
    };
    tracing::info!(payment_id = %existing.id, "idempotent replay, returning stored session");

    // The URL is not stored locally; ask the gateway again.
    let checkout_url = match gateway.retrieve_session(&reference).await {
        Ok(session) => session.url,
        Err(e) => {
            tracing::warn!(error = %e, session = %reference, "could not refresh checkout url");
            None
        }
    };

    Ok(CheckoutReference {
        payment_id: existing.id,
        session_reference: reference,
        checkout_url,
        status: existing.status(),
        replayed: true,
    })
}
