//! Payment reconciliation for multi-merchant storefronts.
//!
//! Each merchant collects payments with its own provider credential. An order
//! is paid either through a hosted checkout (a payment *preference* the
//! browser is redirected to) or by charging a tokenized card directly. In
//! both cases the provider is the source of truth: the order only leaves
//! `awaiting_payment` when the provider reports an approved payment for it.
//!
//! - [`service::PaymentService`] exposes every operation.
//! - [`routes::routes`] serves them over HTTP.
//! - [`provider::PaymentProvider`] abstracts the payment provider API.
//! - [`store`] holds orders and merchant credentials.

pub mod charge;
pub mod cmd;
pub mod config;
pub mod confirmation;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod money;
pub mod order;
pub mod preference;
pub mod provider;
pub mod routes;
pub mod service;
pub mod signal;
pub mod store;
pub mod telemetry;
