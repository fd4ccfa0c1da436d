//! The payment reconciliation service.
//!
//! [`PaymentService`] wires the credential resolver, preference builder,
//! intent gateway, confirmation engine and charge processor together behind
//! the operations exposed over HTTP.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::charge::{ChargeOutcome, DirectChargeProcessor, TokenizedPaymentData};
use crate::confirmation::{
    Clock, Confirmation, ConfirmationEngine, ConfirmationPoller, RetryPolicy, TokioClock,
    Transition, apply_payment_status,
};
use crate::credential::{CredentialResolver, PaymentCredential};
use crate::error::PaymentError;
use crate::gateway::PaymentIntentGateway;
use crate::metrics::record_outcome;
use crate::order::{LineItem, NewOrder, Order};
use crate::preference::PreferenceBuilder;
use crate::provider::{PaymentProvider, PaymentQuery};
use crate::store::{CredentialStore, OrderStore};

/// Currency used when none is configured.
pub const DEFAULT_CURRENCY: &str = "BRL";

/// Tunables of a [`PaymentService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// ISO currency of every preference line.
    pub currency: String,
    /// Policy of server-side confirmation polling.
    pub retry: RetryPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Checkout payload for the redirect payment path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Order being paid.
    pub order_id: String,
    /// Cart lines.
    pub items: Vec<LineItem>,
    /// Amount to charge, delivery fee included.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    /// Merchant display name, used for the statement descriptor.
    pub merchant_name: String,
    /// Storefront origin the browser returns to.
    pub client_base_url: String,
}

fn ensure_payable(order: &Order) -> Result<(), PaymentError> {
    if order.status.accepts_payment() {
        Ok(())
    } else {
        Err(PaymentError::InvalidRequest(format!(
            "order '{}' is {} and cannot take a payment",
            order.id, order.status
        )))
    }
}

/// Entry point for every payment operation.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    credentials: CredentialResolver,
    provider: Arc<dyn PaymentProvider>,
    builder: PreferenceBuilder,
    gateway: PaymentIntentGateway,
    engine: ConfirmationEngine,
    poller: ConfirmationPoller,
    charges: DirectChargeProcessor,
}

impl PaymentService {
    /// Assembles the service over its stores and provider.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn PaymentProvider>,
        settings: ServiceSettings,
    ) -> Self {
        Self::with_clock(orders, credentials, provider, settings, Arc::new(TokioClock))
    }

    /// Like [`PaymentService::new`] with an explicit poller clock.
    pub fn with_clock(
        orders: Arc<dyn OrderStore>,
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn PaymentProvider>,
        settings: ServiceSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let credentials = CredentialResolver::new(credentials);
        let engine =
            ConfirmationEngine::new(Arc::clone(&orders), credentials.clone(), Arc::clone(&provider));
        Self {
            poller: ConfirmationPoller::new(engine.clone(), settings.retry, clock),
            charges: DirectChargeProcessor::new(
                Arc::clone(&orders),
                credentials.clone(),
                Arc::clone(&provider),
            ),
            gateway: PaymentIntentGateway::new(Arc::clone(&provider)),
            builder: PreferenceBuilder::new(settings.currency),
            engine,
            orders,
            credentials,
            provider,
        }
    }

    /// Places a new order awaiting payment.
    ///
    /// # Errors
    ///
    /// Validation or store failures.
    pub async fn place_order(&self, new: NewOrder) -> Result<Order, PaymentError> {
        let order = Order::place(new)?;
        self.orders.insert(order.clone()).await?;
        tracing::info!(order_id = %order.id, merchant_id = %order.merchant_id, total = %order.total_amount, "order placed");
        Ok(order)
    }

    /// Fetches an order for status polling.
    ///
    /// # Errors
    ///
    /// [`PaymentError::OrderNotFound`] or store failures.
    pub async fn order(&self, order_id: &str) -> Result<Order, PaymentError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_owned()))
    }

    /// Creates a payment preference and returns the checkout redirect URL.
    ///
    /// The credential is resolved before anything is sent to the provider.
    ///
    /// # Errors
    ///
    /// [`PaymentError::CredentialMissing`], [`PaymentError::NoValidItems`],
    /// validation errors, or provider failures.
    pub async fn create_preference(
        &self,
        checkout: &CheckoutRequest,
    ) -> Result<String, PaymentError> {
        let order = self.order(&checkout.order_id).await?;
        ensure_payable(&order)?;
        let credential = self.credentials.resolve(&order.merchant_id).await?;
        let request = self.builder.build(
            &order.id,
            &checkout.items,
            checkout.total_amount,
            &checkout.merchant_name,
            &checkout.client_base_url,
        )?;
        self.gateway.create_preference(&request, &credential).await
    }

    /// Confirms an order's payment against the provider.
    ///
    /// With `wait` set, keeps confirming per the configured [`RetryPolicy`]
    /// until the payment reaches a terminal status.
    ///
    /// # Errors
    ///
    /// See [`ConfirmationEngine::confirm`].
    pub async fn confirm_payment(
        &self,
        order_id: &str,
        wait: bool,
    ) -> Result<Confirmation, PaymentError> {
        let confirmation = if wait {
            self.poller.run(order_id).await?.confirmation
        } else {
            self.engine.confirm(order_id).await?
        };
        record_outcome("confirm", confirmation.status());
        Ok(confirmation)
    }

    /// Charges a tokenized card and applies an approval to the order.
    ///
    /// # Errors
    ///
    /// See [`DirectChargeProcessor::charge`]; also refuses orders that are
    /// no longer awaiting payment.
    pub async fn charge_card(
        &self,
        order_id: &str,
        total_amount: Decimal,
        payer_email: &str,
        payment_data: TokenizedPaymentData,
    ) -> Result<(ChargeOutcome, Transition), PaymentError> {
        ensure_payable(&self.order(order_id).await?)?;
        let outcome = self
            .charges
            .charge(order_id, total_amount, payer_email, payment_data)
            .await?;
        record_outcome("charge", outcome.status.as_str());
        let transition = apply_payment_status(self.orders.as_ref(), order_id, &outcome.status).await?;
        Ok((outcome, transition))
    }

    /// Stores a merchant credential and reports whether the provider
    /// accepts its secret key.
    ///
    /// The credential is kept even when verification fails.
    ///
    /// # Errors
    ///
    /// Validation or store failures. Provider failures only clear the
    /// `verified` flag.
    pub async fn save_credentials(
        &self,
        merchant_id: &str,
        credential: PaymentCredential,
    ) -> Result<bool, PaymentError> {
        self.credentials.save(merchant_id, credential).await?;
        let credential = self.credentials.resolve(merchant_id).await?;
        let verified = match self
            .provider
            .search_payments(&PaymentQuery::probe(), &credential)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(merchant_id, error = %e, "credential verification failed");
                false
            }
        };
        tracing::info!(merchant_id, verified, "merchant credential saved");
        Ok(verified)
    }
}
