//! Synchronous card charges with a browser-tokenized card.
//!
//! Card data never reaches this service; the browser widget exchanges it for
//! a single-use token first. A declined card is a business outcome and is
//! reported as a regular [`ChargeOutcome`], not as an error.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialResolver;
use crate::error::PaymentError;
use crate::money::round_cents;
use crate::provider::{ChargeRequest, Identification, Payer, PaymentProvider, ProviderStatus};
use crate::store::OrderStore;

/// Card data as produced by the provider's tokenization widget.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizedPaymentData {
    /// Single-use card token.
    pub token: String,
    /// Card brand identifier (e.g. `visa`, `master`).
    pub payment_method_id: String,
    /// Card issuer identifier.
    #[serde(default)]
    pub issuer_id: Option<String>,
    /// Payer tax document.
    #[serde(default)]
    pub identification: Option<Identification>,
}

/// Result of a charge, as reported to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    /// Provider payment status.
    pub status: ProviderStatus,
    /// Provider reason code or rejection reason, shown to the shopper.
    pub status_detail: String,
    /// Provider payment identifier, absent when the charge was refused
    /// before a payment was created.
    pub payment_id: Option<u64>,
}

impl ChargeOutcome {
    fn declined(reason: String) -> Self {
        Self {
            status: ProviderStatus::Rejected,
            status_detail: reason,
            payment_id: None,
        }
    }
}

/// Submits tokenized card charges. Never writes order status itself.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct DirectChargeProcessor {
    orders: Arc<dyn OrderStore>,
    credentials: CredentialResolver,
    provider: Arc<dyn PaymentProvider>,
}

impl DirectChargeProcessor {
    /// Creates a processor.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        credentials: CredentialResolver,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            orders,
            credentials,
            provider,
        }
    }

    /// Charges the card for `order_id`.
    ///
    /// The idempotency key combines the order id with the single-use card
    /// token: resending one token cannot charge twice, while a new token
    /// after a decline is a fresh attempt.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidRequest`] for a malformed request,
    /// [`PaymentError::OrderNotFound`], [`PaymentError::CredentialMissing`],
    /// and provider failures other than a client-side rejection.
    pub async fn charge(
        &self,
        order_id: &str,
        total_amount: Decimal,
        payer_email: &str,
        payment_data: TokenizedPaymentData,
    ) -> Result<ChargeOutcome, PaymentError> {
        if total_amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidRequest(
                "totalAmount must be positive".into(),
            ));
        }
        if payer_email.trim().is_empty() || !payer_email.contains('@') {
            return Err(PaymentError::InvalidRequest("payerEmail is invalid".into()));
        }
        if payment_data.token.trim().is_empty() || payment_data.payment_method_id.trim().is_empty()
        {
            return Err(PaymentError::InvalidRequest(
                "card token and payment method are required".into(),
            ));
        }

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_owned()))?;
        let credential = self.credentials.resolve(&order.merchant_id).await?;

        let idempotency_key = format!("charge-{order_id}-{}", payment_data.token.trim());
        let request = ChargeRequest {
            transaction_amount: round_cents(total_amount),
            token: payment_data.token,
            description: format!("Order {order_id}"),
            installments: 1,
            payment_method_id: payment_data.payment_method_id,
            issuer_id: payment_data.issuer_id,
            payer: Payer {
                email: payer_email.trim().to_owned(),
                identification: payment_data.identification,
            },
            external_reference: order_id.to_owned(),
        };

        match self
            .provider
            .create_payment(&request, &idempotency_key, &credential)
            .await
        {
            Ok(payment) => {
                let status_detail = payment
                    .status_detail
                    .unwrap_or_else(|| payment.status.to_string());
                tracing::info!(
                    order_id,
                    payment_id = payment.id,
                    status = %payment.status,
                    %status_detail,
                    "card charge processed"
                );
                Ok(ChargeOutcome {
                    status: payment.status,
                    status_detail,
                    payment_id: Some(payment.id),
                })
            }
            Err(PaymentError::ProviderRejected { status, reason }) if is_decline(status) => {
                tracing::info!(order_id, status, %reason, "card charge declined");
                Ok(ChargeOutcome::declined(reason))
            }
            Err(e) => Err(e),
        }
    }
}

/// Client-side rejections other than authentication problems, which are the
/// merchant's configuration fault rather than the shopper's card.
const fn is_decline(status: u16) -> bool {
    status >= 400 && status < 500 && status != 401 && status != 403
}
