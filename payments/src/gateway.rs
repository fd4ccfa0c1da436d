//! Payment intent creation on the provider.

use std::sync::Arc;

use crate::credential::PaymentCredential;
use crate::error::PaymentError;
use crate::preference::PreferenceRequest;
use crate::provider::PaymentProvider;

/// Sends preferences to the provider and picks the checkout URL.
///
/// One call creates one remote preference. Nothing is retried here: a retry
/// by the caller must reuse the same order id so the external reference keeps
/// joining local and remote state.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct PaymentIntentGateway {
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentIntentGateway {
    /// Creates a gateway over `provider`.
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    /// Creates the preference and returns the URL the browser is sent to.
    ///
    /// Sandbox credentials get the sandbox checkout page when the provider
    /// returns one.
    ///
    /// # Errors
    ///
    /// [`PaymentError::ProviderRejected`] or
    /// [`PaymentError::ProviderUnavailable`] as reported by the provider.
    pub async fn create_preference(
        &self,
        request: &PreferenceRequest,
        credential: &PaymentCredential,
    ) -> Result<String, PaymentError> {
        let created = self.provider.create_preference(request, credential).await?;
        tracing::info!(
            order_id = %request.external_reference,
            preference_id = %created.id,
            "payment preference created"
        );
        let redirect = match created.sandbox_init_point {
            Some(sandbox) if credential.is_sandbox() && !sandbox.is_empty() => sandbox,
            _ => created.init_point,
        };
        Ok(redirect)
    }
}
