// src/models/request.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::roles::{SENIOR_LEVEL, STAFF_LEVEL};

/// Workflow categories. Personnel decisions (promotion, demotion, rule
/// changes) are reviewed by staff; the rest by senior moderators and up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Promotion,
    Demotion,
    ExamAuthorization,
    RuleChange,
    Absence,
    Other,
}

impl RequestCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestCategory::Promotion => "promotion",
            RequestCategory::Demotion => "demotion",
            RequestCategory::ExamAuthorization => "exam_authorization",
            RequestCategory::RuleChange => "rule_change",
            RequestCategory::Absence => "absence",
            RequestCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<RequestCategory> {
        match s {
            "promotion" => Some(RequestCategory::Promotion),
            "demotion" => Some(RequestCategory::Demotion),
            "exam_authorization" => Some(RequestCategory::ExamAuthorization),
            "rule_change" => Some(RequestCategory::RuleChange),
            "absence" => Some(RequestCategory::Absence),
            "other" => Some(RequestCategory::Other),
            _ => None,
        }
    }

    /// Categories that act on a concrete person and therefore require
    /// `assigned_to`.
    pub fn requires_subject(self) -> bool {
        matches!(
            self,
            RequestCategory::Promotion
                | RequestCategory::Demotion
                | RequestCategory::ExamAuthorization
        )
    }

    /// Minimum hierarchy level allowed to review this category.
    pub fn required_reviewer_level(self) -> i64 {
        match self {
            RequestCategory::Promotion
            | RequestCategory::Demotion
            | RequestCategory::RuleChange => STAFF_LEVEL,
            RequestCategory::ExamAuthorization
            | RequestCategory::Absence
            | RequestCategory::Other => SENIOR_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    /// Non-terminal marker: a reviewer has picked the request up. Can move
    /// on to approved/rejected but never back to pending.
    Review,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Review => "review",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<RequestStatus> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "review" => Some(RequestStatus::Review),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Priority> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Generic "request → review → decision" entity, reused for promotions,
/// exam authorizations, rule changes, absences and the rest.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: i64,
    pub category: RequestCategory,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub requested_by: i64,
    /// The person the request acts on (candidate, promotee, …).
    pub assigned_to: Option<i64>,
    pub status: RequestStatus,
    pub response: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Free-form extra data; `exam_id` here links an exam-authorization
    /// request to the exam a session is spawned from on approval.
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Request {
    /// Exam referenced by an exam-authorization request, if any.
    pub fn exam_id(&self) -> Option<i64> {
        self.metadata.get("exam_id").and_then(|v| v.as_i64())
    }
}

/// DTO for submitting a request.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequestRequest {
    pub category: RequestCategory,
    #[validate(length(min = 1, max = 150, message = "Title must not be blank."))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub assigned_to: Option<i64>,
    #[serde(default = "default_metadata")]
    #[validate(custom(function = validate_metadata_size))]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::json!({})
}

/// Limits the metadata payload size to prevent resource exhaustion.
fn validate_metadata_size(data: &serde_json::Value) -> Result<(), validator::ValidationError> {
    if data.to_string().len() > 10_000 {
        return Err(validator::ValidationError::new("metadata_too_large"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn as_status(self) -> RequestStatus {
        match self {
            DecisionOutcome::Approved => RequestStatus::Approved,
            DecisionOutcome::Rejected => RequestStatus::Rejected,
        }
    }
}

/// DTO for deciding a request.
#[derive(Debug, Deserialize, Validate)]
pub struct DecideRequestRequest {
    pub outcome: DecisionOutcome,
    #[validate(length(max = 4000))]
    pub response: Option<String>,
}
