use {
    super::error::ReconcileError,
    super::money::{Currency, MoneyAmount},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    ToConfirm,
    Authorized,
    Failed,
    Canceled,
    Refunded,
    Abandoned,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ToConfirm => "to_confirm",
            Self::Authorized => "authorized",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
            Self::Abandoned => "abandoned",
        }
    }

    /// Exhaustive transition table — I1. If an edge isn't listed here, it's
    /// not allowed. Terminal states (Failed, Canceled, Refunded, Abandoned)
    /// never regress.
    pub fn can_transition_to(&self, new: &Self) -> bool {
        matches!(
            (self, new),
            (Self::Pending, Self::ToConfirm)
                | (Self::Pending, Self::Authorized)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Canceled)
                | (Self::Pending, Self::Abandoned)
                | (Self::ToConfirm, Self::Authorized)
                | (Self::ToConfirm, Self::Failed)
                | (Self::ToConfirm, Self::Canceled)
                | (Self::ToConfirm, Self::Abandoned)
                | (Self::Authorized, Self::Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Canceled | Self::Refunded | Self::Abandoned
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "to_confirm" => Ok(Self::ToConfirm),
            "authorized" => Ok(Self::Authorized),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "refunded" => Ok(Self::Refunded),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(ReconcileError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Webpay,
    Stripe,
    Paypal,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webpay => "webpay",
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Provider {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "webpay" => Ok(Self::Webpay),
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            other => Err(ReconcileError::Validation(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Contrato,
    Cuotas,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contrato => "contrato",
            Self::Cuotas => "cuotas",
        }
    }

    pub fn is_cuota(&self) -> bool {
        matches!(self, Self::Cuotas)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentType {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "contrato" => Ok(Self::Contrato),
            "cuotas" => Ok(Self::Cuotas),
            other => Err(ReconcileError::Validation(format!(
                "unknown payment type: {other}"
            ))),
        }
    }
}

/// Read model for a payment row, assembled by the persistent-store layer
/// from the `payment` table plus its denormalized owner/contract/deposit/
/// aux-amount side tables. Mutated only by the Poller.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub status: PaymentStatus,
    pub provider: Provider,
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub amount_minor: MoneyAmount,
    pub currency: Currency,
    pub aux_amount_minor: Option<MoneyAmount>,
    pub payment_order_id: Option<String>,
    pub order_customer_rut: Option<String>,
    pub authorization_code: Option<String>,
    pub contract_number: Option<String>,
    pub quota_numbers: Vec<i32>,
    pub payment_type: Option<PaymentType>,
    pub should_notify_crm: bool,
    pub deposit_name: Option<String>,
    pub deposit_rut: Option<String>,
    pub context: serde_json::Value,
    pub provider_metadata: serde_json::Value,
    pub first_authorized_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Count of `StatusCheck` rows for this payment — I5.
    pub attempts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_transition_valid_paths() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(&ToConfirm));
        assert!(Pending.can_transition_to(&Authorized));
        assert!(Pending.can_transition_to(&Failed));
        assert!(Pending.can_transition_to(&Canceled));
        assert!(Pending.can_transition_to(&Abandoned));
        assert!(ToConfirm.can_transition_to(&Authorized));
        assert!(ToConfirm.can_transition_to(&Failed));
        assert!(ToConfirm.can_transition_to(&Canceled));
        assert!(ToConfirm.can_transition_to(&Abandoned));
        assert!(Authorized.can_transition_to(&Refunded));
    }

    #[test]
    fn can_transition_invalid_paths() {
        use PaymentStatus::*;
        assert!(!Pending.can_transition_to(&Pending));
        assert!(!Authorized.can_transition_to(&Pending));
        assert!(!Authorized.can_transition_to(&Failed));
        assert!(!Failed.can_transition_to(&Pending));
        assert!(!Canceled.can_transition_to(&Pending));
        assert!(!Refunded.can_transition_to(&Authorized));
        assert!(!Abandoned.can_transition_to(&Pending));
        assert!(!ToConfirm.can_transition_to(&Pending));
    }

    #[test]
    fn terminal_states() {
        use PaymentStatus::*;
        assert!(Failed.is_terminal());
        assert!(Canceled.is_terminal());
        assert!(Refunded.is_terminal());
        assert!(Abandoned.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!ToConfirm.is_terminal());
        assert!(!Authorized.is_terminal());
    }

    #[test]
    fn status_as_str_roundtrip() {
        let statuses = [
            PaymentStatus::Pending,
            PaymentStatus::ToConfirm,
            PaymentStatus::Authorized,
            PaymentStatus::Failed,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
            PaymentStatus::Abandoned,
        ];
        for s in &statuses {
            let parsed = PaymentStatus::try_from(s.as_str()).unwrap();
            assert_eq!(&parsed, s);
        }
    }

    #[test]
    fn status_try_from_unknown_is_err() {
        assert!(PaymentStatus::try_from("settled").is_err());
    }

    #[test]
    fn provider_as_str_roundtrip() {
        for p in [Provider::Webpay, Provider::Stripe, Provider::Paypal] {
            assert_eq!(Provider::try_from(p.as_str()).unwrap(), p);
        }
    }

    #[test]
    fn payment_type_roundtrip() {
        for t in [PaymentType::Contrato, PaymentType::Cuotas] {
            assert_eq!(PaymentType::try_from(t.as_str()).unwrap(), t);
        }
        assert!(PaymentType::Cuotas.is_cuota());
        assert!(!PaymentType::Contrato.is_cuota());
    }
}
