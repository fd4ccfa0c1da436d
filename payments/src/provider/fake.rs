//! In-process [`PaymentProvider`] for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ChargeRequest, CreatedPreference, PaymentProvider, PaymentQuery, PaymentRecord};
use crate::credential::PaymentCredential;
use crate::error::PaymentError;
use crate::preference::PreferenceRequest;

/// Scripted failure returned by every call while set.
#[derive(Debug, Clone)]
pub enum Failure {
    Rejected(u16, String),
    Unavailable,
}

impl Failure {
    fn to_error(&self) -> PaymentError {
        match self {
            Self::Rejected(status, reason) => PaymentError::ProviderRejected {
                status: *status,
                reason: reason.clone(),
            },
            Self::Unavailable => PaymentError::ProviderUnavailable("scripted".into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeProvider {
    payments: Mutex<Vec<PaymentRecord>>,
    failure: Mutex<Option<Failure>>,
    pub preferences: Mutex<Vec<PreferenceRequest>>,
    pub charges: Mutex<Vec<(ChargeRequest, String)>>,
    pub searches: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_payment(&self, record: PaymentRecord) {
        self.payments.lock().unwrap().push(record);
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn outbound_calls(&self) -> usize {
        self.preferences.lock().unwrap().len()
            + self.charges.lock().unwrap().len()
            + self.searches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PaymentError> {
        match &*self.failure.lock().unwrap() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
        _credential: &PaymentCredential,
    ) -> Result<CreatedPreference, PaymentError> {
        self.preferences.lock().unwrap().push(request.clone());
        self.check()?;
        Ok(CreatedPreference {
            id: format!("pref-{}", request.external_reference),
            init_point: format!("https://provider.test/checkout/{}", request.external_reference),
            sandbox_init_point: Some(format!(
                "https://sandbox.provider.test/checkout/{}",
                request.external_reference
            )),
        })
    }

    async fn search_payments(
        &self,
        query: &PaymentQuery,
        _credential: &PaymentCredential,
    ) -> Result<Vec<PaymentRecord>, PaymentError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let payments = self.payments.lock().unwrap();
        // Insertion order; callers must not rely on the provider's sorting.
        Ok(payments
            .iter()
            .filter(|p| {
                query.external_reference.is_none()
                    || p.external_reference == query.external_reference
            })
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn create_payment(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
        _credential: &PaymentCredential,
    ) -> Result<PaymentRecord, PaymentError> {
        self.charges
            .lock()
            .unwrap()
            .push((request.clone(), idempotency_key.to_owned()));
        self.check()?;
        let approved = request.token != "declined-token";
        Ok(PaymentRecord {
            id: 9000 + self.charges.lock().unwrap().len() as u64,
            external_reference: Some(request.external_reference.clone()),
            status: if approved {
                super::ProviderStatus::Approved
            } else {
                super::ProviderStatus::Rejected
            },
            status_detail: Some(if approved { "accredited" } else { "cc_rejected_other_reason" }.to_owned()),
            transaction_amount: Some(request.transaction_amount),
            date_created: None,
        })
    }
}
