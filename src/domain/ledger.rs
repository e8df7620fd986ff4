use {
    super::{
        BoxFuture,
        actor::Actor,
        attachment::FileAttachment,
        error::ServiceError,
        feedback::{RequestNote, Review},
        id::{AttachmentId, PaymentId, RequestId, SessionRef},
        payment::{ConfirmOutcome, NewPayment, Payment, PaymentInsert},
        request::{RequestChange, RequestUpdate, ServiceRequest},
    },
    chrono::{DateTime, Utc},
};

type Res<T> = Result<T, ServiceError>;

/// Persistence for service requests and everything they own.
///
/// `ServiceRequest` is the sole owner of its payments, attachments, notes and
/// reviews: dependents are only ever removed together with their request.
pub trait LedgerStore: Send + Sync {
    fn insert_request<'a>(&'a self, request: &'a ServiceRequest) -> BoxFuture<'a, Res<()>>;

    fn get_request<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Option<ServiceRequest>>>;

    /// Apply a staff edit to the current row while holding its lock, so a
    /// concurrent confirmation is never overwritten with a stale status.
    /// A status change is audited in the same transaction. `NotFound` if
    /// the row is gone.
    fn update_request<'a>(
        &'a self,
        id: &'a RequestId,
        update: RequestUpdate,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<RequestChange>>;

    /// Remove a request with all of its dependents in one transaction.
    /// Returns the removed attachments so storage can be cleaned up.
    fn delete_request<'a>(
        &'a self,
        id: &'a RequestId,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<Option<Vec<FileAttachment>>>>;

    fn request_for_attachment(
        &self,
        id: AttachmentId,
    ) -> BoxFuture<'_, Res<Option<ServiceRequest>>>;

    fn add_attachment<'a>(&'a self, attachment: &'a FileAttachment) -> BoxFuture<'a, Res<()>>;

    fn list_attachments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<FileAttachment>>>;

    fn list_payments<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Payment>>>;

    /// Insert a provisional payment unless one with the same
    /// `(request_id, idempotency_key)` exists, in which case that row is
    /// returned untouched.
    fn insert_payment<'a>(
        &'a self,
        payment: &'a NewPayment,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<PaymentInsert>>;

    fn record_checkout_reference<'a>(
        &'a self,
        id: PaymentId,
        reference: &'a SessionRef,
    ) -> BoxFuture<'a, Res<()>>;

    /// Compensating delete for a payment whose session was never created.
    /// Confirmed payments are never deleted here. Returns whether a row went away.
    fn delete_payment<'a>(&'a self, id: PaymentId, actor: &'a Actor) -> BoxFuture<'a, Res<bool>>;

    fn get_payment(&self, id: PaymentId) -> BoxFuture<'_, Res<Option<Payment>>>;

    /// Serialized check-and-set: if the payment is not yet confirmed, mark it
    /// `Confirmed(Completed)` with `session`, move its request to
    /// `PaymentReceived`, and queue a receipt, all atomically. Otherwise
    /// write nothing and report `AlreadyConfirmed`.
    fn confirm_payment<'a>(
        &'a self,
        id: PaymentId,
        session: &'a SessionRef,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<ConfirmOutcome>>;

    /// Provisional payments that have a live (not expired) checkout session
    /// and were created before `older_than`, oldest first.
    fn list_unconfirmed_checkouts(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Res<Vec<Payment>>>;

    /// Take a provisional payment out of the sweep once its session expired.
    fn mark_checkout_expired(&self, id: PaymentId) -> BoxFuture<'_, Res<()>>;

    /// Delete provisional payments created before `older_than` that never got
    /// a checkout session, i.e. initiations that died mid-flight. Returns how
    /// many went away.
    fn purge_stalled_payments<'a>(
        &'a self,
        older_than: DateTime<Utc>,
        actor: &'a Actor,
    ) -> BoxFuture<'a, Res<u64>>;

    fn add_note<'a>(&'a self, note: &'a RequestNote) -> BoxFuture<'a, Res<()>>;

    fn list_notes<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<RequestNote>>>;

    /// `Conflict` if the author already reviewed this request.
    fn add_review<'a>(&'a self, review: &'a Review) -> BoxFuture<'a, Res<()>>;

    fn list_reviews<'a>(&'a self, id: &'a RequestId) -> BoxFuture<'a, Res<Vec<Review>>>;
}
