//! Read/write contract for persisted orders and merchant credentials.
//!
//! The relational store lives outside this service; [`OrderStore`] and
//! [`CredentialStore`] are the only operations the payment flow needs.
//! [`InMemoryStore`] implements both and backs the server and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::credential::PaymentCredential;
use crate::error::PaymentError;
use crate::order::{Order, OrderStatus};

/// Result of a compare-and-set on an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order was in the expected status and now holds the new one.
    Applied,
    /// The order was in another status and was left untouched.
    Unchanged(OrderStatus),
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. Fails if the identifier is already taken.
    async fn insert(&self, order: Order) -> Result<(), PaymentError>;

    /// Fetches an order by identifier.
    async fn get(&self, order_id: &str) -> Result<Option<Order>, PaymentError>;

    /// Moves the order from `expected` to `next` atomically.
    ///
    /// Fails with [`PaymentError::OrderNotFound`] for an unknown order and
    /// with [`PaymentError::InvalidRequest`] if `next` is not a forward step
    /// from `expected`.
    async fn compare_and_set_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<StatusUpdate, PaymentError>;
}

/// Merchant credential persistence. One record per merchant.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetches the credential of a merchant.
    async fn get(&self, merchant_id: &str) -> Result<Option<PaymentCredential>, PaymentError>;

    /// Inserts or replaces the credential of a merchant.
    async fn upsert(
        &self,
        merchant_id: &str,
        credential: PaymentCredential,
    ) -> Result<(), PaymentError>;
}

/// Thread-safe in-memory store for orders and credentials.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    credentials: Arc<RwLock<HashMap<String, PaymentCredential>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert(&self, order: Order) -> Result<(), PaymentError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(PaymentError::InvalidRequest(format!(
                "order '{}' already exists",
                order.id
            )));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, PaymentError> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<StatusUpdate, PaymentError> {
        if !expected.can_advance_to(next) {
            return Err(PaymentError::InvalidRequest(format!(
                "illegal status transition {expected} -> {next}"
            )));
        }
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_owned()))?;
        if order.status != expected {
            return Ok(StatusUpdate::Unchanged(order.status));
        }
        order.status = next;
        Ok(StatusUpdate::Applied)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get(&self, merchant_id: &str) -> Result<Option<PaymentCredential>, PaymentError> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(merchant_id).cloned())
    }

    async fn upsert(
        &self,
        merchant_id: &str,
        credential: PaymentCredential,
    ) -> Result<(), PaymentError> {
        let mut credentials = self.credentials.write().await;
        credentials.insert(merchant_id.to_owned(), credential);
        Ok(())
    }
}
