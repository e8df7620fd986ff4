pub mod audit_repo;
pub mod outbox_repo;
pub mod payment_repo;
pub mod request_repo;

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
    audit_repo::insert_audit_entry,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

type Res<T> = Result<T, ServiceError>;

/// Postgres-backed ledger. Every multi-row write runs in one transaction.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_payment_inner(&self, payment: &NewPayment, actor: &Actor) -> Res<PaymentInsert> {
        let mut tx = self.pool.begin().await?;

        let created = payment_repo::insert_payment(&mut tx, payment)
            .await
            .map_err(|e| match e {
                ServiceError::Database(err) => request_repo::not_found_on_fk(err, payment.request_id()),
                other => other,
            })?;

        match created {
            Some(row) => {
                insert_audit_entry(&mut tx, &row.audit_entry(actor, "created")).await?;
                tx.commit().await?;
                Ok(PaymentInsert::Created(row))
            }
            None => {
                let existing = payment_repo::find_by_idempotency_key(
                    &mut tx,
                    payment.request_id(),
                    payment.idempotency_key(),
                )
                .await?
                .ok_or_else(|| {
                    ServiceError::Conflict("payment with this idempotency key vanished".into())
                })?;
                tx.commit().await?;
                Ok(PaymentInsert::Existing(existing))
            }
        }
    }

    async fn delete_payment_inner(&self, id: PaymentId, actor: &Actor) -> Res<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(removed) = payment_repo::delete_unconfirmed(&mut tx, id).await? else {
            tx.commit().await?;
            return Ok(false);
        };
        insert_audit_entry(&mut tx, &removed.audit_entry(actor, "rolled_back")).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Confirmation also takes the request row lock, so the edit is applied
    /// either before it or on top of it.
    async fn update_request_inner(
        &self,
        id: &RequestId,
        update: RequestUpdate,
        actor: &Actor,
    ) -> Res<RequestChange> {
        let mut tx = self.pool.begin().await?;
        let current = request_repo::lock_request(&mut tx, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("service request not found with id: {id}")))?;

        let (change, audit) = update.apply_locked(current, actor)?;
        if !request_repo::update_request(&mut tx, &change.request).await? {
            return Err(ServiceError::NotFound(format!(
                "service request not found with id: {id}"
            )));
        }
        if let Some(entry) = &audit {
            insert_audit_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(change)
    }

    async fn purge_stalled_inner(&self, older_than: DateTime<Utc>, actor: &Actor) -> Res<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = payment_repo::delete_stalled(&mut tx, older_than).await?;
        for payment in &removed {
            insert_audit_entry(&mut tx, &payment.audit_entry(actor, "purged")).await?;
        }
        tx.commit().await?;
        Ok(removed.len() as u64)
    }

    /// Lock, check, then write payment, request status, receipt and audit
    /// rows in a single transaction. Concurrent callers queue on the row lock
    /// and observe the committed `confirmed` flag.
    async fn confirm_payment_inner(
        &self,
        id: PaymentId,
        session: &SessionRef,
        actor: &Actor,
    ) -> Res<ConfirmOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await?;

        let payment = payment_repo::lock_payment(&mut tx, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment not found with id: {id}")))?;

        if payment.is_confirmed() {
            tx.commit().await?;
            return Ok(ConfirmOutcome::AlreadyConfirmed(payment));
        }

        let confirmed = payment_repo::mark_confirmed(&mut tx, id, session).await?;

        let old_status =
            request_repo::set_status(&mut tx, &confirmed.request_id, RequestStatus::PaymentReceived)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "service request not found with id: {}",
                        confirmed.request_id
                    ))
                })?;

        outbox_repo::enqueue(&mut tx, &Notification::payment_receipt(&confirmed)).await?;

        insert_audit_entry(&mut tx, &confirmed.audit_entry(actor, "confirmed")).await?;
        let status_audit = NewAuditEntry::new(
            "service_request",
            confirmed.request_id.to_string(),
            actor,
            "status_changed",
            serde_json::json!({
                "old_status": old_status.as_str(),
                "new_status": RequestStatus::PaymentReceived.as_str(),
                "payment_id": id.to_string(),
            }),
        );
        insert_audit_entry(&mut tx, &status_audit).await?;

        tx.commit().await?;
        Ok(ConfirmOutcome::Confirmed(confirmed))
    }
}

impl LedgerStore for PgLedger {
    fn insert_request<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Res<()>> {
        Box::pin(request_repo::insert_request(&self.pool, request))
    }

    fn get_request<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Option<ServiceRequest>>> {
        Box::pin(request_repo::get_request(&self.pool, id))
    }

    fn update_request<'a>(
        &'a self,
        id: &'a RequestId,
        update: RequestUpdate,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<RequestChange>> {
        Box::pin(self.update_request_inner(id, update, actor))
    }

    fn delete_request<'a>(
        &'a self,
        id: &'a RequestId,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<Option<Vec<FileAttachment>>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let Some(removed) = request_repo::delete_request(&mut tx, id).await? else {
                return Ok(None);
            };
            let entry = NewAuditEntry::new(
                "service_request",
                id.to_string(),
                actor,
                "deleted",
                serde_json::json!({ "attachments": removed.len() }),
            );
            insert_audit_entry(&mut tx, &entry).await?;
            tx.commit().await?;
            Ok(Some(removed))
        })
    }

    fn request_for_attachment(
        &self,
        id: AttachmentId,
    ) -> BoxFuture<'_, Res<Option<ServiceRequest>>> {
        Box::pin(request_repo::find_by_attachment(&self.pool, id))
    }

    fn add_attachment<'a>(&'a self, attachment: &'a FileAttachment) -> BoxFuture<'a, Res<()>> {
        Box::pin(request_repo::insert_attachment(&self.pool, attachment))
    }

    fn list_attachments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<FileAttachment>>> {
        Box::pin(request_repo::list_attachments(&self.pool, id))
    }

    fn list_payments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Payment>>> {
        Box::pin(payment_repo::list_for_request(&self.pool, id))
    }

    fn insert_payment<'a>(
        &'a self,
        payment: &'a NewPayment,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<PaymentInsert>> {
        Box::pin(self.insert_payment_inner(payment, actor))
    }

    fn record_checkout_reference<'a>(
        &'a self,
        id: PaymentId,
        reference: &'a SessionRef,
    ) -> BoxFuture<'a, Res<()>> {
        Box::pin(payment_repo::record_checkout_reference(&self.pool, id, reference))
    }

    fn delete_payment<'a>(&'a self, id: PaymentId, actor: &'a Actor) -> BoxFuture<'a, Res<bool>> {
        Box::pin(self.delete_payment_inner(id, actor))
    }

    fn get_payment(&self, id: PaymentId) -> BoxFuture<'_, Res<Option<Payment>>> {
        Box::pin(payment_repo::get_payment(&self.pool, id))
    }

    fn confirm_payment<'a>(
        &'a self,
        id: PaymentId,
        session: &'a SessionRef,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<ConfirmOutcome>> {
        Box::pin(self.confirm_payment_inner(id, session, actor))
    }

    fn list_unconfirmed_checkouts(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Res<Vec<Payment>>> {
        Box::pin(payment_repo::list_unconfirmed_checkouts(&self.pool, older_than, limit))
    }

    fn mark_checkout_expired(&self, id: PaymentId) -> BoxFuture<'_, Res<()>> {
        Box::pin(payment_repo::mark_checkout_expired(&self.pool, id))
    }

    fn purge_stalled_payments<'a>(
        &'a self,
        older_than: DateTime<Utc>,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<u64>> {
        Box::pin(self.purge_stalled_inner(older_than, actor))
    }

    fn add_note<'a>(&'a self, note: &'a RequestNote) -> BoxFuture<'a, Res<()>> {
        Box::pin(request_repo::insert_note(&self.pool, note))
    }

    fn list_notes<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<RequestNote>>> {
        Box::pin(request_repo::list_notes(&self.pool, id))
    }

    fn add_review<'a>(&'a self, review: &'a Review) -> BoxFuture<'a, Res<()>> {
        Box::pin(request_repo::insert_review(&self.pool, review))
    }

    fn list_reviews<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Review>>> {
        Box::pin(request_repo::list_reviews(&self.pool, id))
    }
}

impl NotificationOutbox for PgLedger {
    fn enqueue(&self, notification: Notification) -> BoxFuture<'_, Res<Uuid>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let id = outbox_repo::enqueue(&mut tx, &notification).await?;
            tx.commit().await?;
            Ok(id)
        })
    }

    fn claim(&self, limit: i64) -> BoxFuture<'_, Res<Vec<OutboxJob>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let jobs = outbox_repo::claim(&mut tx, limit).await?;
            tx.commit().await?;
            Ok(jobs)
        })
    }

    fn complete(&self, id: Uuid) -> BoxFuture<'_, Res<()>> {
        Box::pin(outbox_repo::complete(&self.pool, id))
    }

    fn fail(&self, id: Uuid, error: String, max_attempts: i32) -> BoxFuture<'_, Res<()>> {
        Box::pin(async move { outbox_repo::fail(&self.pool, id, &error, max_attempts).await })
    }

    fn reap_stale(&self) -> BoxFuture<'_, Res<u64>> {
        Box::pin(outbox_repo::reap_stale(&self.pool))
    }
}
