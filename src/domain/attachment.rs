use {
    super::{
        error::ServiceError,
        id::{AttachmentId, RequestId, UserId},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilePurpose {
    UserFile,
    Proposal,
    Deliverable,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserFile => "user_file",
            Self::Proposal => "proposal",
            Self::Deliverable => "deliverable",
        }
    }

    /// Case-insensitive parse of user input. Malformed purposes are a state
    /// error, not a validation error, so the caller gets a 400.
    pub fn parse(input: &str) -> Result<Self, ServiceError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "user_file" => Ok(Self::UserFile),
            "proposal" => Ok(Self::Proposal),
            "deliverable" => Ok(Self::Deliverable),
            other => Err(ServiceError::InvalidState(format!(
                "invalid file purpose: {other}; must be one of USER_FILE, PROPOSAL, DELIVERABLE"
            ))),
        }
    }
}

impl TryFrom<&str> for FilePurpose {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

/// Metadata of a file already placed in storage by the upload layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: AttachmentId,
    pub request_id: RequestId,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub storage_path: String,
    pub purpose: FilePurpose,
    pub uploaded_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_size: i64,
    #[serde(default)]
    pub content_type: Option<String>,
    pub storage_path: String,
    #[serde(default = "default_purpose")]
    pub purpose: String,
}

fn default_purpose() -> String {
    FilePurpose::UserFile.as_str().to_string()
}

impl AttachmentUpload {
    pub fn into_attachment(
        self,
        request_id: RequestId,
        uploaded_by: Option<UserId>,
    ) -> Result<FileAttachment, ServiceError> {
        let purpose = FilePurpose::parse(&self.purpose)?;
        if self.file_name.trim().is_empty() {
            return Err(ServiceError::Validation("file name must not be blank".into()));
        }
        if self.storage_path.trim().is_empty() {
            return Err(ServiceError::Validation("storage path must not be blank".into()));
        }
        if self.file_size < 0 {
            return Err(ServiceError::Validation(format!(
                "file size cannot be negative, got: {}",
                self.file_size
            )));
        }
        Ok(FileAttachment {
            id: AttachmentId::generate(),
            request_id,
            file_name: self.file_name.trim().to_string(),
            file_size: self.file_size,
            content_type: self.content_type,
            storage_path: self.storage_path,
            purpose,
            uploaded_by,
            created_at: Utc::now(),
        })
    }
}
