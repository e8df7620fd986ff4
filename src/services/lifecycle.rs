use {
    crate::domain::{
        actor::Actor,
        attachment::{AttachmentUpload, FileAttachment, FilePurpose},
        error::ServiceError,
        feedback::{NewReview, RequestNote, Review},
        id::{AttachmentId, PaymentId, RequestId},
        ledger::LedgerStore,
        money::Amount,
        notification::{Notification, NotificationOutbox},
        payment::{Payment, PaymentStatus},
        request::{NewServiceRequest, RequestUpdate, ServiceRequest},
    },
    chrono::{DateTime, Utc},
    serde::Serialize,
};

/// A request together with everything it owns, in creation order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub attachments: Vec<FileAttachment>,
    pub payments: Vec<PaymentSummary>,
    pub notes: Vec<RequestNote>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub amount: Amount,
    pub currency: String,
    pub email: String,
    pub status: PaymentStatus,
    pub confirmed: bool,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount,
            currency: payment.currency.code(),
            email: payment.email.clone(),
            status: payment.status(),
            confirmed: payment.is_confirmed(),
            session_id: payment.session_id.as_ref().map(|s| s.to_string()),
            created_at: payment.created_at,
        }
    }
}

async fn load(ledger: &dyn LedgerStore, id: &RequestId) -> Result<ServiceRequest, ServiceError> {
    ledger
        .get_request(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("service request not found with id: {id}")))
}

/// Queue a notification. Failures are logged and swallowed: the state
/// change that produced the notification has already committed.
async fn emit(outbox: &dyn NotificationOutbox, notification: Notification) {
    let kind = notification.kind();
    if let Err(e) = outbox.enqueue(notification).await {
        tracing::error!(kind, error = %e, "failed to queue notification");
    }
}

#[tracing::instrument(name = "create_request", skip_all, fields(actor = %actor))]
pub async fn create_request(
    ledger: &dyn LedgerStore,
    outbox: &dyn NotificationOutbox,
    actor: &Actor,
    input: NewServiceRequest,
    locale: &str,
) -> Result<ServiceRequest, ServiceError> {
    let request = input.into_request(actor.id().cloned())?;
    ledger.insert_request(&request).await?;
    tracing::info!(request_id = %request.id, "service request submitted");

    if request.contact_email.is_some() || request.owner.is_some() {
        emit(outbox, Notification::request_created(&request, locale)).await;
    }
    emit(outbox, Notification::new_request_alert(&request)).await;

    Ok(request)
}

pub async fn get_request(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
) -> Result<RequestView, ServiceError> {
    let request = load(ledger, id).await?;
    actor.require_staff_or_owner(request.owner.as_ref(), "service request")?;

    let attachments = ledger.list_attachments(id).await?;
    let payments = ledger.list_payments(id).await?;
    let notes = ledger.list_notes(id).await?;
    let reviews = ledger.list_reviews(id).await?;

    Ok(RequestView {
        request,
        attachments,
        payments: payments.iter().map(PaymentSummary::from).collect(),
        notes,
        reviews,
    })
}

/// Staff edit. Every provided field is written as given; a status change
/// off the recommended graph goes through but is flagged in the log and
/// the audit trail. The edit lands on the current row, so fields it does not
/// name (status included) keep whatever a concurrent confirmation wrote.
#[tracing::instrument(name = "update_request", skip_all, fields(request_id = %id, actor = %actor))]
pub async fn update_request(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
    update: RequestUpdate,
) -> Result<ServiceRequest, ServiceError> {
    actor.require_staff("updating a service request")?;
    if update.is_empty() {
        return load(ledger, id).await;
    }

    let change = ledger.update_request(id, update, actor).await?;
    let request = change.request;
    if let Some(old) = change.previous_status {
        if old.can_transition_to(&request.status) {
            tracing::info!(from = %old, to = %request.status, "status changed");
        } else {
            tracing::warn!(from = %old, to = %request.status, "status change off the lifecycle graph");
        }
    }
    Ok(request)
}

#[tracing::instrument(name = "add_attachment", skip_all, fields(request_id = %id, actor = %actor))]
pub async fn add_attachment(
    ledger: &dyn LedgerStore,
    outbox: &dyn NotificationOutbox,
    actor: &Actor,
    id: &RequestId,
    upload: AttachmentUpload,
    locale: &str,
) -> Result<FileAttachment, ServiceError> {
    let request = load(ledger, id).await?;
    actor.require_staff_or_owner(request.owner.as_ref(), "service request")?;

    let attachment = upload.into_attachment(request.id.clone(), actor.id().cloned())?;
    ledger.add_attachment(&attachment).await?;
    tracing::info!(attachment_id = %attachment.id, purpose = attachment.purpose.as_str(), "attachment added");

    if attachment.purpose == FilePurpose::Proposal {
        emit(outbox, Notification::proposal_uploaded(&request, locale)).await;
    }

    Ok(attachment)
}

pub async fn request_for_attachment(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    attachment_id: AttachmentId,
) -> Result<ServiceRequest, ServiceError> {
    let request = ledger
        .request_for_attachment(attachment_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("attachment not found with id: {attachment_id}"))
        })?;
    actor.require_staff_or_owner(request.owner.as_ref(), "attachment")?;
    Ok(request)
}

/// Remove a request and everything it owns. Returns the removed
/// attachments so their stored files can be cleaned up by the caller.
#[tracing::instrument(name = "delete_request", skip_all, fields(request_id = %id, actor = %actor))]
pub async fn delete_request(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
) -> Result<Vec<FileAttachment>, ServiceError> {
    let request = load(ledger, id).await?;
    if !actor.is_admin() && !actor.owns(request.owner.as_ref()) {
        return Err(ServiceError::Forbidden(
            "only an admin or the owner can delete a service request".into(),
        ));
    }

    let removed = ledger
        .delete_request(id, actor)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("service request not found with id: {id}")))?;
    tracing::info!(attachments = removed.len(), "service request deleted");
    Ok(removed)
}

pub async fn add_note(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
    content: &str,
) -> Result<RequestNote, ServiceError> {
    actor.require_staff("adding a note")?;
    let request = load(ledger, id).await?;
    let note = RequestNote::new(request.id, actor.id().cloned(), content)?;
    ledger.add_note(&note).await?;
    Ok(note)
}

pub async fn add_review(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
    input: NewReview,
) -> Result<Review, ServiceError> {
    let request = load(ledger, id).await?;
    let author = match actor.id() {
        Some(author) if actor.owns(request.owner.as_ref()) => author.clone(),
        _ => {
            return Err(ServiceError::Forbidden(
                "only the owner can review a service request".into(),
            ));
        }
    };
    let review = input.into_review(request.id, author)?;
    ledger.add_review(&review).await?;
    tracing::info!(request_id = %review.request_id, rating = review.rating, "review added");
    Ok(review)
}

pub async fn list_reviews(
    ledger: &dyn LedgerStore,
    actor: &Actor,
    id: &RequestId,
) -> Result<Vec<Review>, ServiceError> {
    let request = load(ledger, id).await?;
    actor.require_staff_or_owner(request.owner.as_ref(), "service request")?;
    ledger.list_reviews(id).await
}
