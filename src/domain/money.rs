use {
    super::error::ReconcileError,
    serde::{Deserialize, Serialize},
    std::fmt,
    std::ops::{Add, Sub},
};

/// A fixed-point amount in a currency's minor units (cents, CLP pesos, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(minor: i64) -> Result<Self, ReconcileError> {
        if minor < 0 {
            return Err(ReconcileError::Validation(format!(
                "MoneyAmount cannot be negative, got: {minor}"
            )));
        }
        Ok(Self(minor))
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }
}

impl Add for MoneyAmount {
    type Output = MoneyAmount;

    fn add(self, rhs: MoneyAmount) -> MoneyAmount {
        self.checked_add(rhs).expect("MoneyAmount overflow")
    }
}

impl Sub for MoneyAmount {
    type Output = MoneyAmount;

    fn sub(self, rhs: MoneyAmount) -> MoneyAmount {
        self.checked_sub(rhs).expect("MoneyAmount underflow")
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement currencies this platform's PSPs report in. CLP is the
/// merchant's home currency — see `Payment::aux_amount_minor` for the
/// non-CLP conversion side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Clp,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clp => "clp",
            Self::Usd => "usd",
            Self::Eur => "eur",
        }
    }

    pub fn is_clp(&self) -> bool {
        matches!(self, Self::Clp)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "clp" => Ok(Self::Clp),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            other => Err(ReconcileError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}
