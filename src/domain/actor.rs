use {
    super::{error::ServiceError, id::UserId},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Client,
    Guest,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Staff => "staff",
            Self::Client => "client",
            Self::Guest => "guest",
            Self::System => "system",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            "client" | "user" => Ok(Self::Client),
            "guest" => Ok(Self::Guest),
            other => Err(ServiceError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// The identity on whose behalf a core operation runs.
///
/// Passed explicitly into every operation; there is no ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    id: Option<UserId>,
    role: Role,
    label: Option<&'static str>,
}

impl Actor {
    pub fn new(id: Option<UserId>, role: Role) -> Self {
        Self {
            id,
            role,
            label: None,
        }
    }

    pub fn guest() -> Self {
        Self::new(None, Role::Guest)
    }

    /// Background task or webhook acting without a user, e.g. `"webhook:stripe"`.
    pub fn system(label: &'static str) -> Self {
        Self {
            id: None,
            role: Role::System,
            label: Some(label),
        }
    }

    pub fn id(&self) -> Option<&UserId> {
        self.id.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Manager | Role::Staff)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, owner: Option<&UserId>) -> bool {
        matches!((self.id.as_ref(), owner), (Some(me), Some(owner)) if me == owner)
    }

    pub fn require_staff(&self, action: &str) -> Result<(), ServiceError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{action} requires a staff role, caller is {}",
                self.role.as_str()
            )))
        }
    }

    pub fn require_staff_or_owner(
        &self,
        owner: Option<&UserId>,
        action: &str,
    ) -> Result<(), ServiceError> {
        if self.is_staff() || self.owns(owner) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!("access denied to {action}")))
        }
    }
}

/// Audit-log form, e.g. `staff:u_42`, `guest`, `webhook:stripe`.
impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.label, &self.id) {
            (Some(label), _) => write!(f, "{label}"),
            (None, Some(id)) => write!(f, "{}:{}", self.role.as_str(), id),
            (None, None) => write!(f, "{}", self.role.as_str()),
        }
    }
}
