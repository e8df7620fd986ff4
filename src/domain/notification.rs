use {
    super::{
        BoxFuture,
        error::ServiceError,
        id::{PaymentId, RequestId},
        money::Amount,
        payment::Payment,
        request::ServiceRequest,
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Outbound event produced by the core and delivered by the notifier worker.
/// Stored as JSON in the outbox, so variants must stay backwards-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    RequestCreated {
        request_id: RequestId,
        title: String,
        email: Option<String>,
        locale: String,
    },
    NewRequestAlert {
        request_id: RequestId,
        title: String,
    },
    ProposalUploaded {
        request_id: RequestId,
        title: String,
        email: Option<String>,
        locale: String,
    },
    PaymentReceipt {
        payment_id: PaymentId,
        request_id: RequestId,
        email: String,
        amount: Amount,
        currency: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestCreated { .. } => "request_created",
            Self::NewRequestAlert { .. } => "new_request_alert",
            Self::ProposalUploaded { .. } => "proposal_uploaded",
            Self::PaymentReceipt { .. } => "payment_receipt",
        }
    }

    pub fn request_created(request: &ServiceRequest, locale: &str) -> Self {
        Self::RequestCreated {
            request_id: request.id.clone(),
            title: request.title.clone(),
            email: request.contact_email.clone(),
            locale: locale.to_string(),
        }
    }

    pub fn new_request_alert(request: &ServiceRequest) -> Self {
        Self::NewRequestAlert {
            request_id: request.id.clone(),
            title: request.title.clone(),
        }
    }

    pub fn proposal_uploaded(request: &ServiceRequest, locale: &str) -> Self {
        Self::ProposalUploaded {
            request_id: request.id.clone(),
            title: request.title.clone(),
            email: request.contact_email.clone(),
            locale: locale.to_string(),
        }
    }

    pub fn payment_receipt(payment: &Payment) -> Self {
        Self::PaymentReceipt {
            payment_id: payment.id,
            request_id: payment.request_id.clone(),
            email: payment.email.clone(),
            amount: payment.amount,
            currency: payment.currency.code(),
        }
    }
}

/// A claimed outbox row.
#[derive(Debug, Clone)]
pub struct OutboxJob {
    pub id: Uuid,
    pub notification: Notification,
    pub attempts: i32,
}

/// Delivery channel for notifications (mail relay, chat hook, ...).
pub trait Notifier: Send + Sync {
    fn deliver<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), ServiceError>>;
}

/// Durable queue between the core and the notifier.
pub trait NotificationOutbox: Send + Sync {
    /// Queue a notification. Returns the job id.
    fn enqueue(&self, notification: Notification) -> BoxFuture<'_, Result<Uuid, ServiceError>>;

    /// Claim up to `limit` due jobs, marking them as processing.
    fn claim(&self, limit: i64) -> BoxFuture<'_, Result<Vec<OutboxJob>, ServiceError>>;

    fn complete(&self, id: Uuid) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Record a failed attempt; reschedules with backoff or gives up after
    /// `max_attempts`.
    fn fail(&self, id: Uuid, error: String, max_attempts: i32) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Return jobs stuck in processing back to pending. Returns the count.
    fn reap_stale(&self) -> BoxFuture<'_, Result<u64, ServiceError>>;
}
