//! `reqwest` implementation of [`PaymentProvider`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    ChargeRequest, CreatedPreference, PaymentProvider, PaymentQuery, PaymentRecord,
    PaymentSearchResponse, ProviderErrorBody,
};
use crate::credential::PaymentCredential;
use crate::error::{Error, PaymentError};
use crate::preference::PreferenceRequest;

/// Production API root of the provider.
pub const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com/";

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// HTTP client for the provider REST API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: Url,
}

impl ProviderClient {
    /// Creates a client rooted at `base_url`.
    ///
    /// `timeout` bounds every request; it is the only deadline the service
    /// applies to provider calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] if the underlying HTTP client cannot be
    /// built (e.g. TLS backend initialisation failure).
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build HTTP client: {e}")))?;

        // Relative joins drop the last path segment unless it ends with '/'.
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PaymentError> {
        self.base_url.join(path).map_err(|e| {
            PaymentError::ProviderUnavailable(format!("invalid provider endpoint '{path}': {e}"))
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(operation, error = %e, "provider request failed");
            PaymentError::ProviderUnavailable(format!("{operation}: {e}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::error!(operation, %status, error = %e, "provider response truncated");
            PaymentError::ProviderUnavailable(format!("{operation}: {e}"))
        })?;

        if !status.is_success() {
            return Err(rejection(operation, status, &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(operation, %status, %body, error = %e, "unreadable provider response");
            PaymentError::ProviderUnavailable(format!("{operation}: unreadable response: {e}"))
        })
    }
}

/// Classifies a non-success provider response.
fn rejection(operation: &'static str, status: StatusCode, body: &str) -> PaymentError {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(parsed) if parsed.is_structured() => {
            let reason = parsed.reason();
            tracing::warn!(operation, %status, %reason, %body, "provider rejected request");
            PaymentError::ProviderRejected {
                status: status.as_u16(),
                reason,
            }
        }
        _ => {
            tracing::error!(operation, %status, %body, "provider failed without a readable error");
            PaymentError::ProviderUnavailable(format!("{operation}: HTTP {status}"))
        }
    }
}

#[async_trait]
impl PaymentProvider for ProviderClient {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
        credential: &PaymentCredential,
    ) -> Result<CreatedPreference, PaymentError> {
        let url = self.endpoint("checkout/preferences")?;
        let builder = self
            .http
            .post(url)
            .bearer_auth(credential.secret_key())
            .json(request);
        self.send("create_preference", builder).await
    }

    async fn search_payments(
        &self,
        query: &PaymentQuery,
        credential: &PaymentCredential,
    ) -> Result<Vec<PaymentRecord>, PaymentError> {
        let url = self.endpoint("v1/payments/search")?;
        let mut params = vec![
            ("sort", "date_created".to_owned()),
            ("criteria", "desc".to_owned()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(reference) = &query.external_reference {
            params.push(("external_reference", reference.clone()));
        }
        let builder = self
            .http
            .get(url)
            .bearer_auth(credential.secret_key())
            .query(&params);
        let response: PaymentSearchResponse = self.send("search_payments", builder).await?;
        Ok(response.results)
    }

    async fn create_payment(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
        credential: &PaymentCredential,
    ) -> Result<PaymentRecord, PaymentError> {
        let url = self.endpoint("v1/payments")?;
        let builder = self
            .http
            .post(url)
            .bearer_auth(credential.secret_key())
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(request);
        self.send("create_payment", builder).await
    }
}
