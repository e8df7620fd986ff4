use {
    crate::domain::{
        error::ServiceError,
        notification::{Notification, OutboxJob},
    },
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    payload: serde_json::Value,
    attempts: i32,
}

/// Queue a notification inside the caller's transaction, so it is emitted
/// iff the surrounding state change commits.
pub async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    notification: &Notification,
) -> Result<Uuid, ServiceError> {
    let id = Uuid::now_v7();
    sqlx::query(
        r#"
        INSERT INTO notification_outbox (id, kind, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(id)
    .bind(notification.kind())
    .bind(serde_json::to_value(notification)?)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Claim up to `limit` pending jobs for processing.
/// Uses SKIP LOCKED to avoid contention with other workers.
pub async fn claim(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    limit: i64,
) -> Result<Vec<OutboxJob>, ServiceError> {
    let rows: Vec<OutboxRow> = sqlx::query_as(
        r#"
        UPDATE notification_outbox
        SET status = 'processing', updated_at = now()
        WHERE id IN (
            SELECT id FROM notification_outbox
            WHERE status = 'pending' AND scheduled_at <= now()
            ORDER BY scheduled_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, payload, attempts
        "#,
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<OutboxJob, ServiceError> {
            Ok(OutboxJob {
                id: row.id,
                notification: serde_json::from_value(row.payload)?,
                attempts: row.attempts,
            })
        })
        .collect()
}

/// Mark a job as delivered.
pub async fn complete(pool: &sqlx::PgPool, id: Uuid) -> Result<(), ServiceError> {
    sqlx::query(
        "UPDATE notification_outbox SET status = 'completed', updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failure. Exponential backoff via scheduled_at.
/// If max attempts reached, mark as 'failed' permanently.
pub async fn fail(
    pool: &sqlx::PgPool,
    id: Uuid,
    error: &str,
    max_attempts: i32,
) -> Result<(), ServiceError> {
    sqlx::query(
        r#"
        UPDATE notification_outbox
        SET attempts = attempts + 1,
            last_error = $2,
            status = CASE
                WHEN attempts + 1 >= $3 THEN 'failed'
                ELSE 'pending'
            END,
            scheduled_at = CASE
                WHEN attempts + 1 >= $3 THEN scheduled_at
                ELSE now() + make_interval(secs => power(2, LEAST(attempts + 1, 16))::int)
            END,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .bind(max_attempts)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reset jobs stuck in 'processing' for >2 minutes back to 'pending'.
/// Returns the number of reaped jobs.
pub async fn reap_stale(pool: &sqlx::PgPool) -> Result<u64, ServiceError> {
    let result = sqlx::query(
        r#"
        UPDATE notification_outbox
        SET status = 'pending', updated_at = now()
        WHERE status = 'processing' AND updated_at < now() - interval '2 minutes'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
