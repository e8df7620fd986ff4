use {
    crate::{
        adapters::stripe::to_stripe_currency,
        domain::{
            BoxFuture,
            error::ServiceError,
            gateway::{
                CheckoutGateway, CheckoutSessionRequest, CreatedSession, RetrievedSession,
                SessionStatus,
            },
            id::SessionRef,
        },
    },
    std::{collections::BTreeMap, future::Future, time::Duration},
};

/// Hosted Stripe Checkout behind the `CheckoutGateway` port.
pub struct StripeGateway {
    client: stripe::Client,
    timeout: Duration,
}

impl StripeGateway {
    pub fn new(secret_key: &str, timeout: Duration) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            timeout,
        }
    }

    /// Every provider call gets a finite deadline.
    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, stripe::StripeError>>,
    ) -> Result<T, ServiceError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| ServiceError::ExternalService(format!("Stripe API: {e}"))),
            Err(_) => Err(ServiceError::ExternalService(format!(
                "Stripe API: no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn create_session_inner(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let client = self
            .client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(request.idempotency_key.clone()));

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Payment);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.customer_email = Some(&request.payer_email);
        params.metadata = Some(request.metadata.clone().into_iter().collect());
        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency: to_stripe_currency(request.currency),
                unit_amount: Some(request.amount.get()),
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: Some(request.product_description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = self
            .with_deadline(stripe::CheckoutSession::create(&client, params))
            .await?;

        tracing::info!(session = %session.id, "stripe checkout session created");
        Ok(CreatedSession {
            reference: SessionRef::new(session.id.to_string())?,
            url: session.url,
        })
    }

    async fn retrieve_session_inner(
        &self,
        reference: &SessionRef,
    ) -> Result<RetrievedSession, ServiceError> {
        let id = reference
            .as_str()
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| ServiceError::Validation(format!("invalid checkout session id: {e}")))?;

        let session = self
            .with_deadline(stripe::CheckoutSession::retrieve(&self.client, &id, &[]))
            .await?;

        project_session(reference, &serde_json::to_value(&session)?)
    }
}

/// Read the handful of fields the reconciler needs from a session object.
/// Goes through JSON so it works whether the SDK models a field as optional
/// or not.
pub fn project_session(
    reference: &SessionRef,
    raw: &serde_json::Value,
) -> Result<RetrievedSession, ServiceError> {
    let text = |key: &str| raw.get(key).and_then(|v| v.as_str()).map(str::to_string);

    let metadata: BTreeMap<String, String> = raw
        .get("metadata")
        .and_then(|m| m.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(RetrievedSession {
        reference: reference.clone(),
        status: SessionStatus::parse(text("status").as_deref()),
        payment_status: text("payment_status").unwrap_or_else(|| "unknown".to_string()),
        currency: text("currency"),
        url: text("url"),
        metadata,
    })
}

impl CheckoutGateway for StripeGateway {
    fn create_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> BoxFuture<'_, Result<CreatedSession, ServiceError>> {
        Box::pin(self.create_session_inner(request))
    }

    fn retrieve_session(
        &self,
        reference: &SessionRef,
    ) -> BoxFuture<'_, Result<RetrievedSession, ServiceError>> {
        let reference = reference.clone();
        Box::pin(async move { self.retrieve_session_inner(&reference).await })
    }
}
