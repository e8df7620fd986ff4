use {
    super::{
        actor::Actor,
        audit::NewAuditEntry,
        error::ServiceError,
        id::{IdempotencyKey, PaymentId, RequestId, SessionRef},
        money::{Amount, Currency},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Provider name recorded on every payment row.
pub const PAYMENT_PROVIDER: &str = "stripe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Payer committed less than the request price.
    Partial,
    /// Payer committed at least the request price.
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Completed => "completed",
        }
    }

    /// Status hint for a new payment: anything below `price` is partial.
    pub fn for_amount(requested: Amount, price: Amount) -> Self {
        if requested < price {
            Self::Partial
        } else {
            Self::Completed
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            other => Err(ServiceError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Local status plus whether the gateway has vouched for it.
///
/// `Provisional` is the state between row creation and gateway confirmation;
/// its status is a best-effort hint. Only `Confirmed` counts as paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentState {
    Provisional(PaymentStatus),
    Confirmed(PaymentStatus),
}

impl PaymentState {
    pub fn status(&self) -> PaymentStatus {
        match self {
            Self::Provisional(s) | Self::Confirmed(s) => *s,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    pub fn from_parts(status: PaymentStatus, confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed(status)
        } else {
            Self::Provisional(status)
        }
    }

    /// State after the gateway reports the session complete.
    pub fn confirm(self) -> Self {
        Self::Confirmed(PaymentStatus::Completed)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(s) => write!(f, "provisional({s})"),
            Self::Confirmed(s) => write!(f, "confirmed({s})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub request_id: RequestId,
    pub amount: Amount,
    pub currency: Currency,
    pub email: String,
    pub state: PaymentState,
    pub provider: String,
    pub idempotency_key: IdempotencyKey,
    /// Session handed back by the gateway at initiation.
    pub checkout_reference: Option<SessionRef>,
    /// Session that confirmed this payment. Set only on confirmation.
    pub session_id: Option<SessionRef>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set once the gateway reports the checkout session expired.
    pub checkout_expired_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        self.state.status()
    }

    pub fn is_confirmed(&self) -> bool {
        self.state.is_confirmed()
    }

    /// Key the gateway deduplicates session creation on. Scoped to this row,
    /// so a retry after a rolled-back attempt never reuses a key with
    /// different parameters.
    pub fn gateway_idempotency_key(&self) -> String {
        format!("{}:{}", self.request_id, self.id)
    }

    /// Whether a replayed initiation carries the same intent as this row.
    pub fn matches_intent(&self, amount: Amount, email: &str) -> bool {
        self.amount == amount && self.email.eq_ignore_ascii_case(email)
    }

    pub fn audit_entry(&self, actor: &Actor, action: &str) -> NewAuditEntry {
        NewAuditEntry::new(
            "payment",
            self.id.to_string(),
            actor,
            action,
            serde_json::json!({
                "request_id": self.request_id.as_str(),
                "amount": self.amount.value().to_string(),
                "currency": self.currency.as_str(),
                "state": self.state.to_string(),
            }),
        )
    }
}

/// Insert form of [`Payment`]; the id is generated up front with `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    id: PaymentId,
    request_id: RequestId,
    amount: Amount,
    currency: Currency,
    email: String,
    status: PaymentStatus,
    idempotency_key: IdempotencyKey,
}

pub struct NewPaymentParams {
    pub request_id: RequestId,
    pub amount: Amount,
    pub price: Amount,
    pub currency: Currency,
    pub email: String,
    pub idempotency_key: IdempotencyKey,
}

impl NewPayment {
    pub fn new(params: NewPaymentParams) -> Self {
        Self {
            id: PaymentId::generate(),
            status: PaymentStatus::for_amount(params.amount, params.price),
            request_id: params.request_id,
            amount: params.amount,
            currency: params.currency,
            email: params.email,
            idempotency_key: params.idempotency_key,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    /// The row as it exists right after insertion.
    pub fn to_payment(&self, created_at: DateTime<Utc>) -> Payment {
        Payment {
            id: self.id,
            request_id: self.request_id.clone(),
            amount: self.amount,
            currency: self.currency,
            email: self.email.clone(),
            state: PaymentState::Provisional(self.status),
            provider: PAYMENT_PROVIDER.to_string(),
            idempotency_key: self.idempotency_key.clone(),
            checkout_reference: None,
            session_id: None,
            created_at,
            confirmed_at: None,
            checkout_expired_at: None,
        }
    }
}

/// Result of inserting a payment keyed by `(request_id, idempotency_key)`.
#[derive(Debug, Clone)]
pub enum PaymentInsert {
    Created(Payment),
    /// A row with the same idempotency key already exists.
    Existing(Payment),
}

/// Result of the confirmation check-and-set.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// This call moved the payment to `Confirmed` and the request to
    /// `PaymentReceived`.
    Confirmed(Payment),
    /// Another call got there first; nothing was written.
    AlreadyConfirmed(Payment),
}

impl ConfirmOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Confirmed(p) | Self::AlreadyConfirmed(p) => p,
        }
    }
}

/// What `initiate_payment` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReference {
    pub payment_id: PaymentId,
    pub session_reference: SessionRef,
    pub checkout_url: Option<String>,
    pub status: PaymentStatus,
    /// True when this is a replay of an earlier call with the same key.
    pub replayed: bool,
}

/// Body of `GET /payments/confirm-session`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResult {
    pub success: bool,
    pub message: String,
    pub payment_id: Option<String>,
    pub request_id: Option<String>,
    pub amount: Option<Amount>,
    pub currency: Option<String>,
    pub status: Option<PaymentStatus>,
}

impl ConfirmationResult {
    /// An expected business outcome that leaves local state untouched.
    pub fn unconfirmed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payment_id: None,
            request_id: None,
            amount: None,
            currency: None,
            status: None,
        }
    }

    pub fn confirmed(payment: &Payment, currency: String, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payment_id: Some(payment.id.to_string()),
            request_id: Some(payment.request_id.to_string()),
            amount: Some(payment.amount),
            currency: Some(currency),
            status: Some(payment.status()),
        }
    }
}
