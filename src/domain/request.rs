use {
    super::{
        actor::Actor,
        audit::NewAuditEntry,
        error::ServiceError,
        id::{RequestId, UserId},
        money::Amount,
    },
    chrono::{DateTime, NaiveDate, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Submitted,
    UnderReview,
    ProposalSent,
    ProposalApproved,
    PaymentReceived,
    InProgress,
    RevisionRequested,
    Completed,
    Cancelled,
    OnHold,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 10] = [
        Self::Submitted,
        Self::UnderReview,
        Self::ProposalSent,
        Self::ProposalApproved,
        Self::PaymentReceived,
        Self::InProgress,
        Self::RevisionRequested,
        Self::Completed,
        Self::Cancelled,
        Self::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::ProposalSent => "proposal_sent",
            Self::ProposalApproved => "proposal_approved",
            Self::PaymentReceived => "payment_received",
            Self::InProgress => "in_progress",
            Self::RevisionRequested => "revision_requested",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::OnHold => "on_hold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The recommended lifecycle graph. Staff updates are not rejected when
    /// they leave it (they are logged as anomalies instead); payment
    /// confirmation always forces `PaymentReceived`.
    pub fn can_transition_to(&self, next: &RequestStatus) -> bool {
        use RequestStatus::*;
        if self == next {
            return false;
        }
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | OnHold) {
            return true;
        }
        matches!(
            (self, next),
            (Submitted, UnderReview)
                | (UnderReview, ProposalSent)
                | (ProposalSent, ProposalApproved)
                | (ProposalSent, UnderReview)
                | (ProposalApproved, PaymentReceived)
                | (PaymentReceived, InProgress)
                | (InProgress, RevisionRequested)
                | (RevisionRequested, InProgress)
                | (InProgress, Completed)
                | (OnHold, Submitted)
                | (OnHold, UnderReview)
                | (OnHold, ProposalSent)
                | (OnHold, ProposalApproved)
                | (OnHold, PaymentReceived)
                | (OnHold, InProgress)
                | (OnHold, RevisionRequested)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RequestStatus {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ServiceError::Validation(format!("unknown request status: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCategory {
    WebDevelopment,
    MobileDevelopment,
    UiUxDesign,
    DataAnalytics,
    Consulting,
    Other,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebDevelopment => "web_development",
            Self::MobileDevelopment => "mobile_development",
            Self::UiUxDesign => "ui_ux_design",
            Self::DataAnalytics => "data_analytics",
            Self::Consulting => "consulting",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for ServiceCategory {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web_development" => Ok(Self::WebDevelopment),
            "mobile_development" => Ok(Self::MobileDevelopment),
            "ui_ux_design" => Ok(Self::UiUxDesign),
            "data_analytics" => Ok(Self::DataAnalytics),
            "consulting" => Ok(Self::Consulting),
            "other" => Ok(Self::Other),
            other => Err(ServiceError::Validation(format!(
                "unknown service category: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: RequestId,
    pub owner: Option<UserId>,
    pub contact_email: Option<String>,
    pub title: String,
    pub service: ServiceCategory,
    pub description: String,
    pub budget_range: Option<String>,
    /// Authoritative amount owed. `None` (or zero) until staff prices the request.
    pub price: Option<Decimal>,
    pub status: RequestStatus,
    pub expected_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Price that a payment can be initiated against.
    pub fn payable_price(&self) -> Result<Amount, ServiceError> {
        match self.price {
            Some(price) if price > Decimal::ZERO => Amount::new(price)
                .map_err(|e| ServiceError::InvalidState(format!("unpayable price: {e}"))),
            _ => Err(ServiceError::InvalidState(format!(
                "price not set for request {}; cannot create payment session",
                self.id
            ))),
        }
    }
}

/// Intake payload. Validated by [`NewServiceRequest::into_request`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceRequest {
    pub title: String,
    pub service: ServiceCategory,
    pub description: String,
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub expected_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl NewServiceRequest {
    pub fn into_request(self, owner: Option<UserId>) -> Result<ServiceRequest, ServiceError> {
        let title = self.title.trim();
        if title.is_empty() || title.len() > 200 {
            return Err(ServiceError::Validation(
                "title must be 1..=200 characters".into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(ServiceError::Validation("description must not be blank".into()));
        }
        let contact_email = self
            .contact_email
            .map(|email| validate_email(&email))
            .transpose()?;

        let now = Utc::now();
        Ok(ServiceRequest {
            id: RequestId::generate(),
            owner,
            contact_email,
            title: title.to_string(),
            service: self.service,
            description: self.description.trim().to_string(),
            budget_range: self.budget_range.filter(|b| !b.trim().is_empty()),
            price: None,
            status: RequestStatus::Submitted,
            expected_due_date: self.expected_due_date,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Staff edit. Every provided field is applied as-is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdate {
    pub title: Option<String>,
    pub service: Option<ServiceCategory>,
    pub description: Option<String>,
    pub budget_range: Option<String>,
    pub price: Option<Decimal>,
    pub status: Option<RequestStatus>,
    pub expected_due_date: Option<NaiveDate>,
}

impl RequestUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.service.is_none()
            && self.description.is_none()
            && self.budget_range.is_none()
            && self.price.is_none()
            && self.status.is_none()
            && self.expected_due_date.is_none()
    }

    /// Apply onto `request`, returning the previous status when it changed.
    pub fn apply(self, request: &mut ServiceRequest) -> Result<Option<RequestStatus>, ServiceError> {
        let price = self
            .price
            .map(|p| {
                Amount::new(p).map_err(|_| {
                    ServiceError::Validation(format!("price must be greater than zero, got: {p}"))
                })
            })
            .transpose()?;

        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(ServiceError::Validation("title must not be blank".into()));
            }
            request.title = title.trim().to_string();
        }
        if let Some(service) = self.service {
            request.service = service;
        }
        if let Some(description) = self.description {
            request.description = description;
        }
        if let Some(budget_range) = self.budget_range {
            request.budget_range = Some(budget_range);
        }
        if let Some(price) = price {
            request.price = Some(price.value());
        }
        if let Some(due) = self.expected_due_date {
            request.expected_due_date = Some(due);
        }

        let previous = match self.status {
            Some(next) if next != request.status => {
                let previous = request.status;
                request.status = next;
                Some(previous)
            }
            _ => None,
        };

        request.updated_at = Utc::now();
        Ok(previous)
    }

    /// Apply onto the stored row and build the status audit entry, if any.
    /// Callers hold the row lock for the duration.
    pub fn apply_locked(
        self,
        mut request: ServiceRequest,
        actor: &Actor,
    ) -> Result<(RequestChange, Option<NewAuditEntry>), ServiceError> {
        let previous_status = self.apply(&mut request)?;
        let audit = previous_status.map(|old| {
            NewAuditEntry::new(
                "service_request",
                request.id.to_string(),
                actor,
                "status_changed",
                serde_json::json!({
                    "old_status": old.as_str(),
                    "new_status": request.status.as_str(),
                    "anomaly": !old.can_transition_to(&request.status),
                }),
            )
        });
        Ok((
            RequestChange {
                request,
                previous_status,
            },
            audit,
        ))
    }
}

/// Outcome of a staff edit: the row as stored, and the status it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestChange {
    pub request: ServiceRequest,
    pub previous_status: Option<RequestStatus>,
}

pub fn validate_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ServiceError::Validation(format!("invalid email: {email}")));
    }
    Ok(email.to_string())
}
