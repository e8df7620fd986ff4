use {
    crate::domain::{
        BoxFuture,
        actor::Actor,
        attachment::FileAttachment,
        audit::NewAuditEntry,
        error::ServiceError,
        feedback::{RequestNote, Review},
        id::{AttachmentId, PaymentId, RequestId, SessionRef},
        ledger::LedgerStore,
        notification::{Notification, NotificationOutbox, OutboxJob},
        payment::{ConfirmOutcome, NewPayment, Payment, PaymentInsert},
        request::{RequestChange, RequestStatus, RequestUpdate, ServiceRequest},
    },
    chrono::{DateTime, Duration, Utc},
    std::{collections::BTreeMap, sync::Arc},
    tokio::sync::Mutex,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRow {
    pub id: Uuid,
    pub notification: Notification,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the in-memory ledger holds. Requests own the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arena {
    pub requests: BTreeMap<RequestId, ServiceRequest>,
    pub payments: BTreeMap<PaymentId, Payment>,
    pub attachments: Vec<FileAttachment>,
    pub notes: Vec<RequestNote>,
    pub reviews: Vec<Review>,
    pub outbox: Vec<OutboxRow>,
    pub audit: Vec<NewAuditEntry>,
}

impl Arena {
    fn push_outbox(&mut self, notification: Notification) -> Uuid {
        let now = Utc::now();
        let id = Uuid::now_v7();
        self.outbox.push(OutboxRow {
            id,
            notification,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            scheduled_at: now,
            updated_at: now,
        });
        id
    }
}

/// A thread-safe in-memory ledger for tests and local runs.
///
/// A single lock guards the whole arena, so every operation (in particular
/// the confirmation check-and-set) is serialized.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    arena: Arc<Mutex<Arena>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of the current state.
    pub async fn snapshot(&self) -> Arena {
        self.arena.lock().await.clone()
    }

    /// Notifications that have not been delivered yet.
    pub async fn pending_notifications(&self) -> Vec<Notification> {
        self.arena
            .lock()
            .await
            .outbox
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .map(|row| row.notification.clone())
            .collect()
    }
}

type Res<T> = Result<T, ServiceError>;

impl LedgerStore for InMemoryLedger {
    fn insert_request<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if arena.requests.contains_key(&request.id) {
                return Err(ServiceError::Conflict(format!(
                    "request {} already exists",
                    request.id
                )));
            }
            arena.requests.insert(request.id.clone(), request.clone());
            Ok(())
        })
    }

    fn get_request<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Option<ServiceRequest>>> {
        Box::pin(async move { Ok(self.arena.lock().await.requests.get(id).cloned()) })
    }

    fn update_request<'a>(
        &'a self,
        id: &'a RequestId,
        update: RequestUpdate,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<RequestChange>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let current = arena.requests.get(id).cloned().ok_or_else(|| {
                ServiceError::NotFound(format!("service request not found with id: {id}"))
            })?;
            let (change, audit) = update.apply_locked(current, actor)?;
            arena
                .requests
                .insert(change.request.id.clone(), change.request.clone());
            arena.audit.extend(audit);
            Ok(change)
        })
    }

    fn delete_request<'a>(
        &'a self,
        id: &'a RequestId,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<Option<Vec<FileAttachment>>>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if arena.requests.remove(id).is_none() {
                return Ok(None);
            }
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut arena.attachments)
                .into_iter()
                .partition(|a| &a.request_id == id);
            arena.attachments = kept;
            arena.payments.retain(|_, p| &p.request_id != id);
            arena.notes.retain(|n| &n.request_id != id);
            arena.reviews.retain(|r| &r.request_id != id);
            arena.audit.push(NewAuditEntry::new(
                "service_request",
                id.to_string(),
                actor,
                "deleted",
                serde_json::json!({ "attachments": removed.len() }),
            ));
            Ok(Some(removed))
        })
    }

    fn request_for_attachment(
        &self,
        id: AttachmentId,
    ) -> BoxFuture<'_, Res<Option<ServiceRequest>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            Ok(arena
                .attachments
                .iter()
                .find(|a| a.id == id)
                .and_then(|a| arena.requests.get(&a.request_id))
                .cloned())
        })
    }

    fn add_attachment<'a>(&'a self, attachment: &'a FileAttachment) -> BoxFuture<'a, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if !arena.requests.contains_key(&attachment.request_id) {
                return Err(ServiceError::NotFound(format!(
                    "service request not found with id: {}",
                    attachment.request_id
                )));
            }
            arena.attachments.push(attachment.clone());
            Ok(())
        })
    }

    fn list_attachments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<FileAttachment>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            Ok(arena
                .attachments
                .iter()
                .filter(|a| &a.request_id == id)
                .cloned()
                .collect())
        })
    }

    fn list_payments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Payment>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            let mut payments: Vec<Payment> = arena
                .payments
                .values()
                .filter(|p| &p.request_id == id)
                .cloned()
                .collect();
            payments.sort_by_key(|p| (p.created_at, p.id));
            Ok(payments)
        })
    }

    fn insert_payment<'a>(
        &'a self,
        payment: &'a NewPayment,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<PaymentInsert>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if !arena.requests.contains_key(payment.request_id()) {
                return Err(ServiceError::NotFound(format!(
                    "service request not found with id: {}",
                    payment.request_id()
                )));
            }
            if let Some(existing) = arena.payments.values().find(|p| {
                &p.request_id == payment.request_id()
                    && &p.idempotency_key == payment.idempotency_key()
            }) {
                return Ok(PaymentInsert::Existing(existing.clone()));
            }

            let row = payment.to_payment(Utc::now());
            arena.audit.push(row.audit_entry(actor, "created"));
            arena.payments.insert(row.id, row.clone());
            Ok(PaymentInsert::Created(row))
        })
    }

    fn record_checkout_reference<'a>(
        &'a self,
        id: PaymentId,
        reference: &'a SessionRef,
    ) -> BoxFuture<'a, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let payment = arena
                .payments
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("payment not found with id: {id}")))?;
            payment.checkout_reference = Some(reference.clone());
            Ok(())
        })
    }

    fn delete_payment<'a>(&'a self, id: PaymentId, actor: &'a Actor) -> BoxFuture<'a, Res<bool>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let removable = arena
                .payments
                .get(&id)
                .is_some_and(|p| !p.is_confirmed());
            if !removable {
                return Ok(false);
            }
            if let Some(payment) = arena.payments.remove(&id) {
                let entry = payment.audit_entry(actor, "rolled_back");
                arena.audit.push(entry);
            }
            Ok(true)
        })
    }

    fn get_payment(&self, id: PaymentId) -> BoxFuture<'_, Res<Option<Payment>>> {
        Box::pin(async move { Ok(self.arena.lock().await.payments.get(&id).cloned()) })
    }

    fn confirm_payment<'a>(
        &'a self,
        id: PaymentId,
        session: &'a SessionRef,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<ConfirmOutcome>> {
        Box::pin(async move {
            let mut guard = self.arena.lock().await;
            let arena = &mut *guard;

            let payment = arena
                .payments
                .get(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("payment not found with id: {id}")))?;
            if payment.is_confirmed() {
                return Ok(ConfirmOutcome::AlreadyConfirmed(payment.clone()));
            }

            let request = arena.requests.get_mut(&payment.request_id).ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "service request not found with id: {}",
                    payment.request_id
                ))
            })?;
            let old_status = request.status;
            request.status = RequestStatus::PaymentReceived;
            request.updated_at = Utc::now();
            let request_id = request.id.clone();

            let payment = arena
                .payments
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("payment not found with id: {id}")))?;
            payment.state = payment.state.confirm();
            payment.session_id = Some(session.clone());
            payment.confirmed_at = Some(Utc::now());
            let confirmed = payment.clone();

            arena.audit.push(confirmed.audit_entry(actor, "confirmed"));
            arena.audit.push(NewAuditEntry::new(
                "service_request",
                request_id.to_string(),
                actor,
                "status_changed",
                serde_json::json!({
                    "old_status": old_status.as_str(),
                    "new_status": RequestStatus::PaymentReceived.as_str(),
                    "payment_id": id.to_string(),
                }),
            ));
            arena.push_outbox(Notification::payment_receipt(&confirmed));

            Ok(ConfirmOutcome::Confirmed(confirmed))
        })
    }

    fn list_unconfirmed_checkouts(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Res<Vec<Payment>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            let mut due: Vec<Payment> = arena
                .payments
                .values()
                .filter(|p| {
                    !p.is_confirmed()
                        && p.checkout_reference.is_some()
                        && p.checkout_expired_at.is_none()
                        && p.created_at < older_than
                })
                .cloned()
                .collect();
            due.sort_by_key(|p| (p.created_at, p.id));
            due.truncate(usize::try_from(limit).unwrap_or(0));
            Ok(due)
        })
    }

    fn mark_checkout_expired(&self, id: PaymentId) -> BoxFuture<'_, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let payment = arena
                .payments
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("payment not found with id: {id}")))?;
            if !payment.is_confirmed() && payment.checkout_expired_at.is_none() {
                payment.checkout_expired_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    fn purge_stalled_payments<'a>(
        &'a self,
        older_than: DateTime<Utc>,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<u64>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let stalled: Vec<PaymentId> = arena
                .payments
                .values()
                .filter(|p| {
                    !p.is_confirmed() && p.checkout_reference.is_none() && p.created_at < older_than
                })
                .map(|p| p.id)
                .collect();
            for id in &stalled {
                if let Some(payment) = arena.payments.remove(id) {
                    let entry = payment.audit_entry(actor, "purged");
                    arena.audit.push(entry);
                }
            }
            Ok(stalled.len() as u64)
        })
    }

    fn add_note<'a>(&'a self, note: &'a RequestNote) -> BoxFuture<'a, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if !arena.requests.contains_key(&note.request_id) {
                return Err(ServiceError::NotFound(format!(
                    "service request not found with id: {}",
                    note.request_id
                )));
            }
            arena.notes.push(note.clone());
            Ok(())
        })
    }

    fn list_notes<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<RequestNote>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            Ok(arena
                .notes
                .iter()
                .filter(|n| &n.request_id == id)
                .cloned()
                .collect())
        })
    }

    fn add_review<'a>(&'a self, review: &'a Review) -> BoxFuture<'a, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if !arena.requests.contains_key(&review.request_id) {
                return Err(ServiceError::NotFound(format!(
                    "service request not found with id: {}",
                    review.request_id
                )));
            }
            let duplicate = arena
                .reviews
                .iter()
                .any(|r| r.request_id == review.request_id && r.author == review.author);
            if duplicate {
                return Err(ServiceError::Conflict(
                    "a review already exists for this request by the current user".into(),
                ));
            }
            arena.reviews.push(review.clone());
            Ok(())
        })
    }

    fn list_reviews<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Review>>> {
        Box::pin(async move {
            let arena = self.arena.lock().await;
            Ok(arena
                .reviews
                .iter()
                .filter(|r| &r.request_id == id)
                .cloned()
                .collect())
        })
    }
}

impl NotificationOutbox for InMemoryLedger {
    fn enqueue(&self, notification: Notification) -> BoxFuture<'_, Res<Uuid>> {
        Box::pin(async move { Ok(self.arena.lock().await.push_outbox(notification)) })
    }

    fn claim(&self, limit: i64) -> BoxFuture<'_, Res<Vec<OutboxJob>>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let now = Utc::now();
            let limit = usize::try_from(limit).unwrap_or(0);
            let mut claimed = Vec::new();
            for row in arena
                .outbox
                .iter_mut()
                .filter(|row| row.status == OutboxStatus::Pending && row.scheduled_at <= now)
                .take(limit)
            {
                row.status = OutboxStatus::Processing;
                row.updated_at = now;
                claimed.push(OutboxJob {
                    id: row.id,
                    notification: row.notification.clone(),
                    attempts: row.attempts,
                });
            }
            Ok(claimed)
        })
    }

    fn complete(&self, id: Uuid) -> BoxFuture<'_, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if let Some(row) = arena.outbox.iter_mut().find(|row| row.id == id) {
                row.status = OutboxStatus::Completed;
                row.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    fn fail(&self, id: Uuid, error: String, max_attempts: i32) -> BoxFuture<'_, Res<()>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            if let Some(row) = arena.outbox.iter_mut().find(|row| row.id == id) {
                let now = Utc::now();
                row.attempts += 1;
                row.last_error = Some(error);
                row.updated_at = now;
                if row.attempts >= max_attempts {
                    row.status = OutboxStatus::Failed;
                } else {
                    row.status = OutboxStatus::Pending;
                    row.scheduled_at = now + Duration::seconds(1_i64 << row.attempts.min(16));
                }
            }
            Ok(())
        })
    }

    fn reap_stale(&self) -> BoxFuture<'_, Res<u64>> {
        Box::pin(async move {
            let mut arena = self.arena.lock().await;
            let cutoff = Utc::now() - Duration::minutes(2);
            let mut reaped = 0;
            for row in arena
                .outbox
                .iter_mut()
                .filter(|row| row.status == OutboxStatus::Processing && row.updated_at < cutoff)
            {
                row.status = OutboxStatus::Pending;
                row.updated_at = Utc::now();
                reaped += 1;
            }
            Ok(reaped)
        })
    }
}
