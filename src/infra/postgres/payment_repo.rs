use {
    crate::domain::{
        error::ServiceError,
        id::{IdempotencyKey, PaymentId, RequestId, SessionRef},
        money::{Amount, Currency},
        payment::{NewPayment, PAYMENT_PROVIDER, Payment, PaymentState, PaymentStatus},
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::PgPool,
    uuid::Uuid,
};

const PAYMENT_COLUMNS: &str = "id, request_id, amount, currency, email, status, confirmed, \
     provider, idempotency_key, checkout_reference, session_id, created_at, confirmed_at, \
     checkout_expired_at";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    request_id: String,
    amount: Decimal,
    currency: String,
    email: String,
    status: String,
    confirmed: bool,
    provider: String,
    idempotency_key: String,
    checkout_reference: Option<String>,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    checkout_expired_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = ServiceError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::try_from(row.status.as_str())?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            request_id: RequestId::new(row.request_id)?,
            amount: Amount::new(row.amount)?,
            currency: Currency::try_from(row.currency.as_str())?,
            email: row.email,
            state: PaymentState::from_parts(status, row.confirmed),
            provider: row.provider,
            idempotency_key: IdempotencyKey::new(row.idempotency_key)?,
            checkout_reference: row.checkout_reference.map(SessionRef::new).transpose()?,
            session_id: row.session_id.map(SessionRef::new).transpose()?,
            created_at: row.created_at,
            confirmed_at: row.confirmed_at,
            checkout_expired_at: row.checkout_expired_at,
        })
    }
}

/// Insert unless `(request_id, idempotency_key)` already exists.
/// Returns the created row, or `None` on conflict.
pub async fn insert_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    payment: &NewPayment,
) -> Result<Option<Payment>, ServiceError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        r#"
        INSERT INTO payments
            (id, request_id, amount, currency, email, status, confirmed,
             provider, idempotency_key)
        VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8)
        ON CONFLICT (request_id, idempotency_key) DO NOTHING
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(payment.id().as_uuid())
    .bind(payment.request_id().as_str())
    .bind(payment.amount().value())
    .bind(payment.currency().as_str())
    .bind(payment.email())
    .bind(payment.status().as_str())
    .bind(PAYMENT_PROVIDER)
    .bind(payment.idempotency_key().as_str())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn find_by_idempotency_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request_id: &RequestId,
    key: &IdempotencyKey,
) -> Result<Option<Payment>, ServiceError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE request_id = $1 AND idempotency_key = $2"
    ))
    .bind(request_id.as_str())
    .bind(key.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn get_payment(pool: &PgPool, id: PaymentId) -> Result<Option<Payment>, ServiceError> {
    let row: Option<PaymentRow> =
        sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await?;

    row.map(Payment::try_from).transpose()
}

/// Row-lock the payment for the rest of the transaction.
pub async fn lock_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: PaymentId,
) -> Result<Option<Payment>, ServiceError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn mark_confirmed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: PaymentId,
    session: &SessionRef,
) -> Result<Payment, ServiceError> {
    let row: PaymentRow = sqlx::query_as(&format!(
        r#"
        UPDATE payments
        SET status = 'completed', confirmed = true, session_id = $2, confirmed_at = now()
        WHERE id = $1
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(id.as_uuid())
    .bind(session.as_str())
    .fetch_one(&mut **tx)
    .await?;

    Payment::try_from(row)
}

pub async fn record_checkout_reference(
    pool: &PgPool,
    id: PaymentId,
    reference: &SessionRef,
) -> Result<(), ServiceError> {
    let result = sqlx::query("UPDATE payments SET checkout_reference = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(reference.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound(format!(
            "payment not found with id: {id}"
        )));
    }
    Ok(())
}

/// Delete a payment that was never confirmed. Returns the removed row.
pub async fn delete_unconfirmed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: PaymentId,
) -> Result<Option<Payment>, ServiceError> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "DELETE FROM payments WHERE id = $1 AND NOT confirmed RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn list_for_request(pool: &PgPool, id: &RequestId) -> Result<Vec<Payment>, ServiceError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE request_id = $1 ORDER BY created_at, id"
    ))
    .bind(id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn list_unconfirmed_checkouts(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Payment>, ServiceError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
        r#"
        SELECT {PAYMENT_COLUMNS} FROM payments
        WHERE NOT confirmed AND checkout_reference IS NOT NULL
          AND checkout_expired_at IS NULL AND created_at < $1
        ORDER BY created_at, id
        LIMIT $2
        "#
    ))
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn mark_checkout_expired(pool: &PgPool, id: PaymentId) -> Result<(), ServiceError> {
    let found: Option<bool> = sqlx::query_scalar(
        r#"
        UPDATE payments
        SET checkout_expired_at = COALESCE(checkout_expired_at, now())
        WHERE id = $1 AND NOT confirmed
        RETURNING true
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    if found.is_none() {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(pool)
            .await?;
        if !exists {
            return Err(ServiceError::NotFound(format!(
                "payment not found with id: {id}"
            )));
        }
    }
    Ok(())
}

/// Delete provisional rows that never got a checkout session. Returns the removed rows.
pub async fn delete_stalled(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    older_than: DateTime<Utc>,
) -> Result<Vec<Payment>, ServiceError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
        r#"
        DELETE FROM payments
        WHERE NOT confirmed AND checkout_reference IS NULL AND created_at < $1
        RETURNING {PAYMENT_COLUMNS}
        "#
    ))
    .bind(older_than)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter().map(Payment::try_from).collect()
}
