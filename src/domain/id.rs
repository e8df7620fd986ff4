use {
    super::error::ServiceError,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::str::FromStr,
    uuid::Uuid,
};

/// Opaque service-request identifier. No ordering or density is implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Result<Self, ServiceError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::Validation("request id must not be blank".into()));
        }
        if trimmed.len() > 64 {
            return Err(ServiceError::Validation(format!(
                "request id too long: {} chars",
                trimmed.len()
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Local payment row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl FromStr for PaymentId {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ServiceError::Validation(format!("invalid payment id: {s}")))
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl FromStr for $name {
            type Err = ServiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ServiceError::Validation(format!(concat!("invalid ", $label, ": {}"), s)))
            }
        }
    };
}

uuid_id!(AttachmentId, "attachment id");
uuid_id!(NoteId, "note id");
uuid_id!(ReviewId, "review id");

/// Account identifier of a caller, issued by the (external) auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ServiceError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ServiceError::Validation("user id must not be blank".into()));
        }
        Ok(Self(id.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checkout session reference issued by the gateway (`cs_xxx` for Stripe).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRef(String);

impl SessionRef {
    pub fn new(id: impl Into<String>) -> Result<Self, ServiceError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ServiceError::Validation(
                "session reference must not be blank".into(),
            ));
        }
        Ok(Self(id.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client-generated key that makes `initiate_payment` safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ServiceError> {
        let key = key.into();
        let key = key.trim();
        if key.len() < 8 || key.len() > 255 {
            return Err(ServiceError::Validation(format!(
                "idempotency key must be 8..=255 chars, got {}",
                key.len()
            )));
        }
        if !key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ServiceError::Validation(
                "idempotency key must be printable ascii".into(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
