//! Provider wire types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status of a provider payment record.
///
/// Values the service does not know about land in [`ProviderStatus::Other`]
/// and are treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderStatus {
    /// Payment accredited.
    Approved,
    /// Awaiting payer action or provider processing.
    Pending,
    /// Authorized but not captured.
    Authorized,
    /// Under review.
    InProcess,
    /// Disputed by the payer.
    InMediation,
    /// Declined.
    Rejected,
    /// Cancelled or expired.
    Cancelled,
    /// Returned to the payer.
    Refunded,
    /// Reversed by the card issuer.
    ChargedBack,
    /// Any status this service does not model.
    Other(String),
}

impl ProviderStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::InProcess => "in_process",
            Self::InMediation => "in_mediation",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::ChargedBack => "charged_back",
            Self::Other(other) => other,
        }
    }

    /// Whether the provider will not move this payment on its own anymore.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Refunded | Self::ChargedBack
        )
    }
}

impl FromStr for ProviderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "approved" => Self::Approved,
            "pending" => Self::Pending,
            "authorized" => Self::Authorized,
            "in_process" => Self::InProcess,
            "in_mediation" => Self::InMediation,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "charged_back" => Self::ChargedBack,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let Ok(status) = raw.parse::<Self>();
        Ok(status)
    }
}

/// Provider payment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Provider-side payment identifier.
    pub id: u64,
    /// Order identifier the payment was created for.
    #[serde(default)]
    pub external_reference: Option<String>,
    /// Payment status.
    pub status: ProviderStatus,
    /// Provider reason code accompanying the status.
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Charged amount.
    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
    /// Creation time on the provider side.
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
}

/// Filter for a payment search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuery {
    /// Restrict to payments created for this order.
    pub external_reference: Option<String>,
    /// Maximum number of records returned.
    pub limit: u32,
}

impl PaymentQuery {
    /// Most recent payments created for `order_id`.
    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self {
            external_reference: Some(order_id.into()),
            limit: 10,
        }
    }

    /// A single arbitrary payment, used to check that a key is accepted.
    #[must_use]
    pub const fn probe() -> Self {
        Self {
            external_reference: None,
            limit: 1,
        }
    }
}

/// Body of `GET /v1/payments/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSearchResponse {
    /// Matching payments.
    #[serde(default)]
    pub results: Vec<PaymentRecord>,
}

/// Body of a successful `POST /checkout/preferences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPreference {
    /// Provider-side preference identifier.
    pub id: String,
    /// Production checkout URL.
    pub init_point: String,
    /// Checkout URL for test accounts.
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

/// Body of `POST /v1/payments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeRequest {
    /// Amount to charge.
    #[serde(with = "rust_decimal::serde::float")]
    pub transaction_amount: Decimal,
    /// Card token produced by the browser widget.
    pub token: String,
    /// Statement description.
    pub description: String,
    /// Always one; the storefront does not sell in installments.
    pub installments: u32,
    /// Card brand identifier.
    pub payment_method_id: String,
    /// Card issuer identifier, when the widget reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,
    /// Payer data.
    pub payer: Payer,
    /// Order identifier.
    pub external_reference: String,
}

/// Payer section of a [`ChargeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    /// Payer e-mail.
    pub email: String,
    /// Tax document of the payer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Identification>,
}

/// Tax document (CPF/CNPJ) of a payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Document kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Document number.
    pub number: String,
}

/// One entry of the `cause` array in provider error bodies.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCause {
    /// Provider-specific code, numeric or textual.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Structured error body returned by the provider on non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    /// Summary message.
    #[serde(default)]
    pub message: Option<String>,
    /// Short error code.
    #[serde(default)]
    pub error: Option<String>,
    /// Echo of the HTTP status.
    #[serde(default)]
    pub status: Option<u16>,
    /// Detailed causes, most relevant first.
    #[serde(default)]
    pub cause: Vec<ProviderCause>,
}

impl ProviderErrorBody {
    /// Whether the body carries any of the fields the provider documents.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.message.is_some() || self.error.is_some() || !self.cause.is_empty()
    }

    /// First cause description, else the message, else the error code.
    #[must_use]
    pub fn reason(&self) -> String {
        let first_cause = self
            .cause
            .iter()
            .find_map(|cause| cause.description.as_deref())
            .filter(|description| !description.trim().is_empty());
        first_cause
            .or(self.message.as_deref())
            .or(self.error.as_deref())
            .unwrap_or("unknown provider error")
            .to_owned()
    }
}
