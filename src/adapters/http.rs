use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            actor::{Actor, Role},
            attachment::{AttachmentUpload, FileAttachment},
            error::ServiceError,
            feedback::{NewReview, RequestNote, Review},
            id::{AttachmentId, IdempotencyKey, RequestId, SessionRef, UserId},
            payment::{CheckoutReference, ConfirmationResult},
            request::{NewServiceRequest, RequestUpdate, ServiceRequest},
        },
        services::{
            lifecycle::{self, RequestView},
            payment_orchestrator::{self, PaymentIntent},
            reconciler,
        },
    },
    axum::{
        Json,
        extract::{FromRequestParts, Path, Query, State},
        http::{HeaderMap, StatusCode, request::Parts},
    },
    rust_decimal::Decimal,
    serde::Deserialize,
};

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const DEFAULT_LOCALE: &str = "en";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller identity as asserted by the authenticating proxy in front of us.
/// No headers means a guest; an id without a role means a client.
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, ACTOR_ID_HEADER)
            .map(UserId::new)
            .transpose()?;
        let role = match header(&parts.headers, ACTOR_ROLE_HEADER) {
            Some(raw) => Role::try_from(raw)?,
            None if id.is_some() => Role::Client,
            None => Role::Guest,
        };
        Ok(Actor::new(id, role))
    }
}

/// Primary language tag from `Accept-Language`, for notification rendering.
pub struct Locale(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Locale {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let locale = header(&parts.headers, "Accept-Language")
            .and_then(|raw| raw.split(',').next())
            .and_then(|tag| tag.split(';').next())
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && *tag != "*")
            .unwrap_or(DEFAULT_LOCALE);
        Ok(Self(locale.to_string()))
    }
}

fn request_id(raw: String) -> Result<RequestId, ApiError> {
    RequestId::new(raw).map_err(ApiError::from)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Locale(locale): Locale,
    Json(body): Json<NewServiceRequest>,
) -> Result<(StatusCode, Json<ServiceRequest>), ApiError> {
    let request =
        lifecycle::create_request(&*state.ledger, &*state.outbox, &actor, body, &locale).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    let id = request_id(id)?;
    Ok(Json(lifecycle::get_request(&*state.ledger, &actor, &id).await?))
}

pub async fn update_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<RequestUpdate>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let id = request_id(id)?;
    Ok(Json(
        lifecycle::update_request(&*state.ledger, &actor, &id, body).await?,
    ))
}

pub async fn delete_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = request_id(id)?;
    let removed = lifecycle::delete_request(&*state.ledger, &actor, &id).await?;
    for file in &removed {
        tracing::info!(path = %file.storage_path, "attachment file released for cleanup");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_attachment(
    State(state): State<AppState>,
    actor: Actor,
    Locale(locale): Locale,
    Path(id): Path<String>,
    Json(body): Json<AttachmentUpload>,
) -> Result<(StatusCode, Json<FileAttachment>), ApiError> {
    let id = request_id(id)?;
    let attachment =
        lifecycle::add_attachment(&*state.ledger, &*state.outbox, &actor, &id, body, &locale)
            .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn request_for_attachment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let id: AttachmentId = id.parse()?;
    Ok(Json(
        lifecycle::request_for_attachment(&*state.ledger, &actor, id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub content: String,
}

pub async fn add_note(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<(StatusCode, Json<RequestNote>), ApiError> {
    let id = request_id(id)?;
    let note = lifecycle::add_note(&*state.ledger, &actor, &id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let id = request_id(id)?;
    Ok(Json(lifecycle::list_reviews(&*state.ledger, &actor, &id).await?))
}

pub async fn add_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(body): Json<NewReview>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let id = request_id(id)?;
    let review = lifecycle::add_review(&*state.ledger, &actor, &id, body).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: Decimal,
    pub email: String,
}

#[tracing::instrument(name = "http_initiate_payment", skip_all, fields(request_id = %id))]
pub async fn initiate_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PaymentBody>,
) -> Result<Json<CheckoutReference>, ApiError> {
    let id = request_id(id)?;
    let key = header(&headers, IDEMPOTENCY_KEY_HEADER).ok_or_else(|| {
        ServiceError::Validation(format!("{IDEMPOTENCY_KEY_HEADER} header is required"))
    })?;
    let intent = PaymentIntent {
        amount: body.amount,
        email: body.email,
        idempotency_key: IdempotencyKey::new(key)?,
    };

    let reference = payment_orchestrator::initiate_payment_detached(
        state.ledger.clone(),
        state.gateway.clone(),
        state.checkout.clone(),
        actor,
        id,
        intent,
    )
    .await?;
    Ok(Json(reference))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub session_id: String,
}

/// Redirect target of the hosted checkout page.
#[tracing::instrument(name = "http_confirm_session", skip_all, fields(session = %query.session_id))]
pub async fn confirm_session(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<ConfirmationResult>, ApiError> {
    let session = SessionRef::new(query.session_id)?;
    let result = reconciler::confirm_session(
        &*state.ledger,
        &*state.gateway,
        state.checkout.currency,
        &actor,
        &session,
    )
    .await?;
    Ok(Json(result))
}
