use {
    super::{
        error::ServiceError,
        id::{NoteId, RequestId, ReviewId, UserId},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Internal staff note on a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestNote {
    pub id: NoteId,
    pub request_id: RequestId,
    pub author: Option<UserId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl RequestNote {
    pub fn new(
        request_id: RequestId,
        author: Option<UserId>,
        content: &str,
    ) -> Result<Self, ServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ServiceError::Validation("note must not be blank".into()));
        }
        Ok(Self {
            id: NoteId::generate(),
            request_id,
            author,
            content: content.to_string(),
            created_at: Utc::now(),
        })
    }
}

/// Client review of delivered work. One per user per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub request_id: RequestId,
    pub author: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewReview {
    pub fn into_review(self, request_id: RequestId, author: UserId) -> Result<Review, ServiceError> {
        if !(1..=5).contains(&self.rating) {
            return Err(ServiceError::Validation(format!(
                "rating must be between 1 and 5, got: {}",
                self.rating
            )));
        }
        Ok(Review {
            id: ReviewId::generate(),
            request_id,
            author,
            rating: self.rating,
            comment: self.comment.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
        })
    }
}
