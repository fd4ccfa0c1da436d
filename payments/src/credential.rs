//! Per-merchant payment credentials and their resolution.

use std::fmt;
use std::sync::Arc;

use crate::error::PaymentError;
use crate::store::CredentialStore;

/// Secret keys issued by the provider for test accounts carry this prefix.
const SANDBOX_PREFIX: &str = "TEST-";

/// Public/secret key pair of a merchant's provider account.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentCredential {
    /// Key handed to the browser-side tokenization widget.
    pub public_key: String,
    secret_key: String,
}

impl PaymentCredential {
    /// Creates a credential from its key pair.
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Bearer token for server-side provider calls.
    #[must_use]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Whether the credential belongs to a provider test account.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.secret_key.starts_with(SANDBOX_PREFIX)
    }

    fn is_usable(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }
}

impl fmt::Debug for PaymentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCredential")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Looks up the active credential of a merchant.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    /// Creates a resolver reading from `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Returns the merchant's credential.
    ///
    /// # Errors
    ///
    /// [`PaymentError::CredentialMissing`] when no record exists or its secret
    /// key is blank. Store failures are passed through unchanged so they stay
    /// distinguishable from a merchant that never configured payments.
    pub async fn resolve(&self, merchant_id: &str) -> Result<PaymentCredential, PaymentError> {
        match self.store.get(merchant_id).await? {
            Some(credential) if credential.is_usable() => Ok(credential),
            _ => Err(PaymentError::CredentialMissing {
                merchant_id: merchant_id.to_owned(),
            }),
        }
    }

    /// Stores a merchant's credential, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidRequest`] when the merchant id or either key is
    /// blank; store failures otherwise.
    pub async fn save(
        &self,
        merchant_id: &str,
        credential: PaymentCredential,
    ) -> Result<(), PaymentError> {
        if merchant_id.trim().is_empty() {
            return Err(PaymentError::InvalidRequest("merchantId is required".into()));
        }
        if credential.public_key.trim().is_empty() || !credential.is_usable() {
            return Err(PaymentError::InvalidRequest(
                "publicKey and secretKey are required".into(),
            ));
        }
        let credential = PaymentCredential::new(
            credential.public_key.trim(),
            credential.secret_key.trim(),
        );
        self.store.upsert(merchant_id, credential).await
    }
}
