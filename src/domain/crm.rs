use {chrono::DateTime, chrono::Utc, serde::Deserialize, serde::Serialize, std::fmt};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrmOperation {
    PaymentApproved,
    AbandonedCart,
}

impl CrmOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentApproved => "payment_approved",
            Self::AbandonedCart => "abandoned_cart",
        }
    }
}

impl fmt::Display for CrmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CrmOperation {
    type Error = crate::domain::error::ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "payment_approved" => Ok(Self::PaymentApproved),
            "abandoned_cart" => Ok(Self::AbandonedCart),
            other => Err(Self::Error::Validation(format!(
                "unknown crm operation: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrmQueueStatus {
    Pending,
    Sent,
    Failed,
}

impl CrmQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrmQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CrmQueueStatus {
    type Error = crate::domain::error::ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(Self::Error::Validation(format!(
                "unknown crm queue status: {other}"
            ))),
        }
    }
}

/// Row of the outbound CRM delivery queue. Unique on `(payment_id,
/// operation)` — I3. `payload` is frozen at enqueue time (P5) and only
/// replaced by a fresh `enqueue_crm_operation` reset.
#[derive(Debug, Clone)]
pub struct CrmQueueItem {
    pub id: i64,
    pub payment_id: i64,
    pub operation: CrmOperation,
    pub status: CrmQueueStatus,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i32>,
    pub crm_id: Option<String>,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
