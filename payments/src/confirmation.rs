//! Payment confirmation: maps the provider's view of an order's payment onto
//! the local order status.
//!
//! The provider is the only source of truth. Confirmation re-reads it on
//! every call and never trusts a status supplied by the browser. The only
//! write is a compare-and-set from `awaiting_payment` to `pending`, so any
//! number of concurrent or repeated confirmations converge on one state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::credential::CredentialResolver;
use crate::error::PaymentError;
use crate::order::OrderStatus;
use crate::provider::{PaymentProvider, PaymentQuery, PaymentRecord, ProviderStatus};
use crate::store::{OrderStore, StatusUpdate};

/// Effect of a payment status on the local order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order moved from `awaiting_payment` to `pending`.
    Applied,
    /// The payment is approved but the order had already moved on.
    AlreadyAdvanced(OrderStatus),
    /// The payment status does not move the order.
    NoChange,
}

/// Outcome of a single confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The provider has no payment for the order yet. Retry later.
    NotFound,
    /// The most recent payment for the order.
    Payment {
        /// Provider-side payment identifier.
        payment_id: u64,
        /// Provider status, verbatim.
        status: ProviderStatus,
        /// What happened to the local order.
        transition: Transition,
        /// Local status after the confirmation.
        order_status: OrderStatus,
    },
}

impl Confirmation {
    /// Wire status: the provider status, or `not_found`.
    #[must_use]
    pub fn status(&self) -> &str {
        match self {
            Self::NotFound => "not_found",
            Self::Payment { status, .. } => status.as_str(),
        }
    }

    /// Whether polling should stop.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::NotFound => false,
            Self::Payment { status, .. } => status.is_terminal(),
        }
    }
}

/// Applies a provider payment status to the order.
///
/// Only `approved` moves the order, and only out of `awaiting_payment`.
/// Shared by the confirmation engine and the direct charge path.
///
/// # Errors
///
/// Store failures, or [`PaymentError::OrderNotFound`].
pub async fn apply_payment_status(
    orders: &dyn OrderStore,
    order_id: &str,
    status: &ProviderStatus,
) -> Result<Transition, PaymentError> {
    if *status != ProviderStatus::Approved {
        return Ok(Transition::NoChange);
    }
    let update = orders
        .compare_and_set_status(order_id, OrderStatus::AwaitingPayment, OrderStatus::Pending)
        .await?;
    Ok(match update {
        StatusUpdate::Applied => {
            tracing::info!(order_id, "payment approved, order awaiting merchant");
            Transition::Applied
        }
        StatusUpdate::Unchanged(current) => {
            tracing::debug!(order_id, %current, "payment already reconciled");
            Transition::AlreadyAdvanced(current)
        }
    })
}

/// Picks the payment that governs the order: the most recently created one.
fn latest(mut payments: Vec<PaymentRecord>) -> Option<PaymentRecord> {
    // Stable sort keeps the provider's order among records without a date.
    payments.sort_by(|a, b| b.date_created.cmp(&a.date_created));
    payments.into_iter().next()
}

/// Re-derives an order's payment state from the provider.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct ConfirmationEngine {
    orders: Arc<dyn OrderStore>,
    credentials: CredentialResolver,
    provider: Arc<dyn PaymentProvider>,
}

impl ConfirmationEngine {
    /// Creates an engine.
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

    /// Confirms the payment of `order_id`.
    ///
    /// Safe to call any number of times, concurrently included.
    ///
    /// # Errors
    ///
    /// [`PaymentError::OrderNotFound`], [`PaymentError::CredentialMissing`],
    /// provider errors, or store errors. A missing payment is not an error;
    /// it yields [`Confirmation::NotFound`].
    pub async fn confirm(&self, order_id: &str) -> Result<Confirmation, PaymentError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_owned()))?;
        let credential = self.credentials.resolve(&order.merchant_id).await?;

        let payments = self
            .provider
            .search_payments(&PaymentQuery::for_order(order_id), &credential)
            .await?;
        let Some(payment) = latest(payments) else {
            tracing::debug!(order_id, "no payment indexed yet");
            return Ok(Confirmation::NotFound);
        };

        let transition = apply_payment_status(self.orders.as_ref(), order_id, &payment.status).await?;
        let order_status = match transition {
            Transition::Applied => OrderStatus::Pending,
            Transition::AlreadyAdvanced(current) => current,
            Transition::NoChange => order.status,
        };
        tracing::info!(
            order_id,
            payment_id = payment.id,
            status = %payment.status,
            %order_status,
            "payment confirmed against provider"
        );
        Ok(Confirmation::Payment {
            payment_id: payment.id,
            status: payment.status,
            transition,
            order_status,
        })
    }
}

/// Source of delays for the poller.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// When and how often to re-run a confirmation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Attempts before giving up, the first one included.
    pub max_attempts: u32,
    /// Stops polling once it returns `true`.
    pub is_terminal: fn(&Confirmation) -> bool,
}

impl RetryPolicy {
    /// Policy with the default terminal predicate.
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            is_terminal: Confirmation::is_terminal,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), 10)
    }
}

/// Result of a polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Last confirmation observed.
    pub confirmation: Confirmation,
    /// Attempts made.
    pub attempts: u32,
    /// Whether the last confirmation was terminal.
    pub settled: bool,
}

/// Repeats confirmation according to a [`RetryPolicy`].
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct ConfirmationPoller {
    engine: ConfirmationEngine,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ConfirmationPoller {
    /// Creates a poller.
    pub fn new(engine: ConfirmationEngine, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            policy,
            clock,
        }
    }

    /// Confirms until the result is terminal or attempts run out.
    ///
    /// Transient provider failures count as attempts; other errors end the
    /// run immediately.
    ///
    /// # Errors
    ///
    /// The first non-transient error, or the last transient one if no
    /// attempt succeeded.
    pub async fn run(&self, order_id: &str) -> Result<PollOutcome, PaymentError> {
        let mut last: Result<Confirmation, PaymentError> = Ok(Confirmation::NotFound);
        for attempt in 1..=self.policy.max_attempts {
            last = self.engine.confirm(order_id).await;
            match &last {
                Ok(confirmation) if (self.policy.is_terminal)(confirmation) => {
                    return Ok(PollOutcome {
                        confirmation: confirmation.clone(),
                        attempts: attempt,
                        settled: true,
                    });
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(order_id, attempt, error = %e, "confirmation attempt failed");
                }
                Err(_) => break,
            }
            if attempt < self.policy.max_attempts {
                self.clock.sleep(self.policy.interval).await;
            }
        }
        let confirmation = last?;
        Ok(PollOutcome {
            confirmation,
            attempts: self.policy.max_attempts,
            settled: false,
        })
    }
}
