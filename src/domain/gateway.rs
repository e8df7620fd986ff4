use {
    super::{
        BoxFuture,
        error::ServiceError,
        id::SessionRef,
        money::{Currency, MinorUnits},
    },
    std::collections::BTreeMap,
};

/// Metadata keys linking a checkout session back to local rows.
pub const META_REQUEST_ID: &str = "serviceRequestId";
pub const META_PAYMENT_ID: &str = "paymentId";
pub const META_CUSTOMER_EMAIL: &str = "customerEmail";

/// Everything the gateway needs to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub amount: MinorUnits,
    pub currency: Currency,
    pub payer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub product_name: String,
    pub product_description: String,
    pub metadata: BTreeMap<String, String>,
    /// Sent to the provider as its idempotency key.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
    pub reference: SessionRef,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Complete,
    Open,
    Expired,
    Other(String),
}

impl SessionStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("complete") => Self::Complete,
            Some("open") => Self::Open,
            Some("expired") => Self::Expired,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other("unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Complete => "complete",
            Self::Open => "open",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }
}

/// What the reconciler gets back after re-querying the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSession {
    pub reference: SessionRef,
    pub status: SessionStatus,
    /// Provider payment status (`paid`, `unpaid`, ...), for messages only.
    pub payment_status: String,
    pub currency: Option<String>,
    /// Hosted page URL; only present while the session is open.
    pub url: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedSession {
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }

    /// Non-blank metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

pub trait CheckoutGateway: Send + Sync {
    fn create_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> BoxFuture<'_, Result<CreatedSession, ServiceError>>;

    fn retrieve_session(
        &self,
        reference: &SessionRef,
    ) -> BoxFuture<'_, Result<RetrievedSession, ServiceError>>;
}
