use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized result of a provider status call. `None` means "no conclusion
/// yet — retry later", distinct from an error (which is carried alongside
/// on the call result, not here).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappedStatus {
    Authorized,
    ToConfirm,
    Pending,
    Failed,
    Canceled,
}

impl MappedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "authorized",
            Self::ToConfirm => "to_confirm",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for MappedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
