use {
    crate::domain::{
        attachment::{FileAttachment, FilePurpose},
        error::ServiceError,
        feedback::{RequestNote, Review},
        id::{AttachmentId, NoteId, RequestId, ReviewId, UserId},
        request::{RequestStatus, ServiceCategory, ServiceRequest},
    },
    chrono::{DateTime, NaiveDate, Utc},
    rust_decimal::Decimal,
    sqlx::PgPool,
    uuid::Uuid,
};

const REQUEST_COLUMNS: &str = "id, owner_id, contact_email, title, service, description, \
     budget_range, price, status, expected_due_date, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    owner_id: Option<String>,
    contact_email: Option<String>,
    title: String,
    service: String,
    description: String,
    budget_range: Option<String>,
    price: Option<Decimal>,
    status: String,
    expected_due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for ServiceRequest {
    type Error = ServiceError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(ServiceRequest {
            id: RequestId::new(row.id)?,
            owner: row.owner_id.map(UserId::new).transpose()?,
            contact_email: row.contact_email,
            title: row.title,
            service: ServiceCategory::try_from(row.service.as_str())?,
            description: row.description,
            budget_range: row.budget_range,
            price: row.price,
            status: RequestStatus::try_from(row.status.as_str())?,
            expected_due_date: row.expected_due_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    request_id: String,
    file_name: String,
    file_size: i64,
    content_type: Option<String>,
    storage_path: String,
    purpose: String,
    uploaded_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttachmentRow> for FileAttachment {
    type Error = ServiceError;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        Ok(FileAttachment {
            id: AttachmentId::from_uuid(row.id),
            request_id: RequestId::new(row.request_id)?,
            file_name: row.file_name,
            file_size: row.file_size,
            content_type: row.content_type,
            storage_path: row.storage_path,
            purpose: FilePurpose::parse(&row.purpose)?,
            uploaded_by: row.uploaded_by.map(UserId::new).transpose()?,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_request(pool: &PgPool, request: &ServiceRequest) -> Result<(), ServiceError> {
    sqlx::query(
        r#"
        INSERT INTO service_requests
            (id, owner_id, contact_email, title, service, description,
             budget_range, price, status, expected_due_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(request.id.as_str())
    .bind(request.owner.as_ref().map(UserId::as_str))
    .bind(request.contact_email.as_deref())
    .bind(&request.title)
    .bind(request.service.as_str())
    .bind(&request.description)
    .bind(request.budget_range.as_deref())
    .bind(request.price)
    .bind(request.status.as_str())
    .bind(request.expected_due_date)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_request(pool: &PgPool, id: &RequestId) -> Result<Option<ServiceRequest>, ServiceError> {
    let row: Option<RequestRow> = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1"
    ))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(ServiceRequest::try_from).transpose()
}

/// Row-lock the request for the rest of the transaction.
pub async fn lock_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &RequestId,
) -> Result<Option<ServiceRequest>, ServiceError> {
    let row: Option<RequestRow> = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    row.map(ServiceRequest::try_from).transpose()
}

/// Write back a row locked with [`lock_request`]. Returns `false` when no row matched.
pub async fn update_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request: &ServiceRequest,
) -> Result<bool, ServiceError> {
    let result = sqlx::query(
        r#"
        UPDATE service_requests
        SET title = $2, service = $3, description = $4, budget_range = $5,
            price = $6, status = $7, expected_due_date = $8, updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(request.id.as_str())
    .bind(&request.title)
    .bind(request.service.as_str())
    .bind(&request.description)
    .bind(request.budget_range.as_deref())
    .bind(request.price)
    .bind(request.status.as_str())
    .bind(request.expected_due_date)
    .bind(request.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Force a status, returning the previous one (`None` if the row is gone).
pub async fn set_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &RequestId,
    status: RequestStatus,
) -> Result<Option<RequestStatus>, ServiceError> {
    let old: Option<String> = sqlx::query_scalar(
        "SELECT status FROM service_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    let Some(old) = old else {
        return Ok(None);
    };

    sqlx::query("UPDATE service_requests SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id.as_str())
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;

    RequestStatus::try_from(old.as_str()).map(Some)
}

/// Delete the request row; dependents go with it via ON DELETE CASCADE.
/// Attachments are read first (under the row lock) so storage can be cleaned up.
pub async fn delete_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: &RequestId,
) -> Result<Option<Vec<FileAttachment>>, ServiceError> {
    let locked: Option<String> =
        sqlx::query_scalar("SELECT id FROM service_requests WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
    if locked.is_none() {
        return Ok(None);
    }

    let rows: Vec<AttachmentRow> = sqlx::query_as(
        "SELECT * FROM file_attachments WHERE request_id = $1 ORDER BY created_at, id",
    )
    .bind(id.as_str())
    .fetch_all(&mut **tx)
    .await?;
    let attachments = rows
        .into_iter()
        .map(FileAttachment::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    sqlx::query("DELETE FROM service_requests WHERE id = $1")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await?;

    Ok(Some(attachments))
}

pub async fn find_by_attachment(
    pool: &PgPool,
    id: AttachmentId,
) -> Result<Option<ServiceRequest>, ServiceError> {
    let row: Option<RequestRow> = sqlx::query_as(
        r#"
        SELECT r.id, r.owner_id, r.contact_email, r.title, r.service, r.description,
               r.budget_range, r.price, r.status, r.expected_due_date, r.created_at, r.updated_at
        FROM service_requests r
        JOIN file_attachments a ON a.request_id = r.id
        WHERE a.id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;
    row.map(ServiceRequest::try_from).transpose()
}

pub async fn insert_attachment(pool: &PgPool, attachment: &FileAttachment) -> Result<(), ServiceError> {
    sqlx::query(
        r#"
        INSERT INTO file_attachments
            (id, request_id, file_name, file_size, content_type, storage_path,
             purpose, uploaded_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(attachment.id.as_uuid())
    .bind(attachment.request_id.as_str())
    .bind(&attachment.file_name)
    .bind(attachment.file_size)
    .bind(attachment.content_type.as_deref())
    .bind(&attachment.storage_path)
    .bind(attachment.purpose.as_str())
    .bind(attachment.uploaded_by.as_ref().map(UserId::as_str))
    .bind(attachment.created_at)
    .execute(pool)
    .await
    .map_err(|e| not_found_on_fk(e, &attachment.request_id))?;
    Ok(())
}

pub async fn list_attachments(
    pool: &PgPool,
    id: &RequestId,
) -> Result<Vec<FileAttachment>, ServiceError> {
    let rows: Vec<AttachmentRow> = sqlx::query_as(
        "SELECT * FROM file_attachments WHERE request_id = $1 ORDER BY created_at, id",
    )
    .bind(id.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(FileAttachment::try_from).collect()
}

pub async fn insert_note(pool: &PgPool, note: &RequestNote) -> Result<(), ServiceError> {
    sqlx::query(
        r#"
        INSERT INTO request_notes (id, request_id, author_id, content, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(note.id.as_uuid())
    .bind(note.request_id.as_str())
    .bind(note.author.as_ref().map(UserId::as_str))
    .bind(&note.content)
    .bind(note.created_at)
    .execute(pool)
    .await
    .map_err(|e| not_found_on_fk(e, &note.request_id))?;
    Ok(())
}

pub async fn list_notes(pool: &PgPool, id: &RequestId) -> Result<Vec<RequestNote>, ServiceError> {
    let rows: Vec<(Uuid, String, Option<String>, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, request_id, author_id, content, created_at
        FROM request_notes WHERE request_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, request_id, author, content, created_at)| -> Result<_, ServiceError> {
            Ok(RequestNote {
                id: NoteId::from_uuid(id),
                request_id: RequestId::new(request_id)?,
                author: author.map(UserId::new).transpose()?,
                content,
                created_at,
            })
        })
        .collect()
}

pub async fn insert_review(pool: &PgPool, review: &Review) -> Result<(), ServiceError> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        INSERT INTO reviews (id, request_id, author_id, rating, comment, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (request_id, author_id) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(review.id.as_uuid())
    .bind(review.request_id.as_str())
    .bind(review.author.as_str())
    .bind(i16::from(review.rating))
    .bind(review.comment.as_deref())
    .bind(review.created_at)
    .fetch_optional(pool)
    .await
    .map_err(|e| not_found_on_fk(e, &review.request_id))?;

    if inserted.is_none() {
        return Err(ServiceError::Conflict(
            "a review already exists for this request by the current user".into(),
        ));
    }
    Ok(())
}

pub async fn list_reviews(pool: &PgPool, id: &RequestId) -> Result<Vec<Review>, ServiceError> {
    let rows: Vec<(Uuid, String, String, i16, Option<String>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, request_id, author_id, rating, comment, created_at
        FROM reviews WHERE request_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(
            |(id, request_id, author, rating, comment, created_at)| -> Result<_, ServiceError> {
                Ok(Review {
                    id: ReviewId::from_uuid(id),
                    request_id: RequestId::new(request_id)?,
                    author: UserId::new(author)?,
                    rating: u8::try_from(rating).map_err(|_| {
                        ServiceError::Validation(format!("stored rating out of range: {rating}"))
                    })?,
                    comment,
                    created_at,
                })
            },
        )
        .collect()
}

/// Foreign-key violations mean the parent request is gone.
pub fn not_found_on_fk(err: sqlx::Error, id: &RequestId) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            ServiceError::NotFound(format!("service request not found with id: {id}"))
        }
        _ => ServiceError::Database(err),
    }
}
