//! Remote payment provider: wire types, the [`PaymentProvider`] seam, and its
//! HTTP implementation.
//!
//! - `types`: request/response payloads and the [`ProviderStatus`] union.
//! - `client`: [`ProviderClient`], the `reqwest`-backed implementation.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod types;

use async_trait::async_trait;

pub use self::client::*;
pub use self::types::*;

use crate::credential::PaymentCredential;
use crate::error::PaymentError;
use crate::preference::PreferenceRequest;

/// Outbound operations against the payment provider.
///
/// Every call is authenticated with the merchant credential passed in; the
/// provider itself holds no tenant state. Implementations never retry.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// `POST /checkout/preferences`.
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
        credential: &PaymentCredential,
    ) -> Result<CreatedPreference, PaymentError>;

    /// `GET /v1/payments/search`, newest first.
    async fn search_payments(
        &self,
        query: &PaymentQuery,
        credential: &PaymentCredential,
    ) -> Result<Vec<PaymentRecord>, PaymentError>;

    /// `POST /v1/payments` with an idempotency key.
    async fn create_payment(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
        credential: &PaymentCredential,
    ) -> Result<PaymentRecord, PaymentError>;
}
