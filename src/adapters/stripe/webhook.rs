use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{actor::Actor, error::ServiceError, id::SessionRef},
        services::reconciler::confirm_session,
    },
    axum::{Json, extract::State, http::HeaderMap},
};

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn wh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sig = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::WebhookSignature("missing Stripe-Signature header".into()))?;

    let event = stripe::Webhook::construct_event(&body, sig, &state.stripe_webhook_secret)
        .map_err(|e| ServiceError::WebhookSignature(e.to_string()))?;

    let event_id = event.id.to_string();
    let raw_event: serde_json::Value = serde_json::from_str(&body).map_err(ServiceError::from)?;
    let event_type = raw_event
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    tracing::Span::current()
        .record("event_id", tracing::field::display(&event_id))
        .record("event_type", tracing::field::display(&event_type));

    if event_type != CHECKOUT_COMPLETED {
        tracing::info!("unhandled event type, acknowledged");
        return Ok(Json(serde_json::json!({"status": "ignored"})));
    }

    let session_id = match event.data.object {
        stripe::EventObject::CheckoutSession(ref session) => session.id.to_string(),
        _ => {
            tracing::warn!("checkout event without a session object");
            return Ok(Json(serde_json::json!({"status": "ignored_invalid_data"})));
        }
    };
    let session_ref = match SessionRef::new(session_id) {
        Ok(r) => r,
        Err(ServiceError::Validation(msg)) => {
            tracing::warn!("skipping invalid session id: {msg}");
            return Ok(Json(serde_json::json!({"status": "ignored_invalid_data"})));
        }
        Err(e) => return Err(e.into()),
    };

    let actor = Actor::system("webhook:stripe");
    match confirm_session(
        &*state.ledger,
        &*state.gateway,
        state.checkout.currency,
        &actor,
        &session_ref,
    )
    .await
    {
        Ok(result) if result.success => {
            Ok(Json(serde_json::json!({"status": "confirmed", "message": result.message})))
        }
        Ok(result) => Ok(Json(
            serde_json::json!({"status": "unconfirmed", "message": result.message}),
        )),
        // Acknowledged so the provider stops redelivering; logged upstream.
        Err(ServiceError::NotFound(msg)) => {
            Ok(Json(serde_json::json!({"status": "unknown_payment", "message": msg})))
        }
        Err(e) => Err(e.into()),
    }
}
