use {
    super::error::ServiceError,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    rust_decimal_macros::dec,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Largest amount a single checkout may carry (matches `NUMERIC(12,2)`).
const MAX_AMOUNT: Decimal = dec!(9999999999.99);

/// A positive decimal amount in major currency units (e.g. dollars).
///
/// The domain works in decimals; conversion to integer minor units happens
/// only at the gateway boundary via [`Amount::to_minor_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ServiceError> {
        if value <= Decimal::ZERO {
            return Err(ServiceError::Validation(format!(
                "amount must be greater than zero, got: {value}"
            )));
        }
        if value > MAX_AMOUNT {
            return Err(ServiceError::Validation(format!(
                "amount exceeds maximum of {MAX_AMOUNT}, got: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Round half-up to two places and scale to cents.
    pub fn to_minor_units(&self) -> Result<MinorUnits, ServiceError> {
        let cents = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            * dec!(100);
        let cents = cents
            .to_i64()
            .ok_or_else(|| ServiceError::Validation(format!("amount out of range: {}", self.0)))?;
        MinorUnits::new(cents)
    }

    pub fn from_minor_units(units: MinorUnits) -> Result<Self, ServiceError> {
        Self::new(Decimal::new(units.get(), 2))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ServiceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer amount in minor currency units (cents). Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub fn new(cents: i64) -> Result<Self, ServiceError> {
        if cents <= 0 {
            return Err(ServiceError::Validation(format!(
                "minor units must be positive, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checkout currencies. All of them have two minor-unit digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
        }
    }

    pub fn code(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = ServiceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            other => Err(ServiceError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}
