//! Conversion of a cart into a provider payment preference.
//!
//! The builder is pure: it validates and normalises amounts, derives the
//! delivery-fee line, and computes redirect targets. Sending the request is
//! the job of [`PaymentIntentGateway`](crate::gateway::PaymentIntentGateway).

use rust_decimal::Decimal;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use url::Url;

use crate::error::PaymentError;
use crate::money::round_cents;
use crate::order::LineItem;

/// Longest statement descriptor the provider accepts.
pub const DESCRIPTOR_MAX_LEN: usize = 22;

/// Descriptor used when the merchant name sanitises to nothing.
pub const DESCRIPTOR_FALLBACK: &str = "ONLINE ORDER";

const DELIVERY_FEE_TITLE: &str = "Delivery fee";

/// Cash-voucher payments settle days later; the storefront only accepts
/// immediate methods.
const EXCLUDED_PAYMENT_TYPE: &str = "ticket";

/// Checkout outcome encoded in redirect URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Payment approved.
    Approved,
    /// Payment awaiting confirmation.
    Pending,
    /// Payment failed or was abandoned.
    Failure,
}

impl Outcome {
    /// Query-string value of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Failure => "failure",
        }
    }
}

/// One line of a [`PreferenceRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceItem {
    /// Line title shown on the provider checkout page.
    pub title: String,
    /// Units.
    pub quantity: u32,
    /// Unit price rounded to cents.
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// ISO currency code.
    pub currency_id: String,
}

/// Browser redirect targets per outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackUrls {
    /// Target after an approved payment.
    pub success: String,
    /// Target after a pending payment.
    pub pending: String,
    /// Target after a failed payment.
    pub failure: String,
}

/// Reference to a provider payment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentTypeRef {
    /// Payment type identifier.
    pub id: String,
}

/// Payment method restrictions of a preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethods {
    /// Payment types hidden on the checkout page.
    pub excluded_payment_types: Vec<PaymentTypeRef>,
    /// Maximum installments offered.
    pub installments: u32,
}

/// Body of `POST /checkout/preferences`. Built per checkout, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreferenceRequest {
    /// Lines to charge, delivery fee last.
    pub items: Vec<PreferenceItem>,
    /// Redirect targets.
    pub back_urls: BackUrls,
    /// Redirect automatically after approval.
    pub auto_return: String,
    /// Order identifier.
    pub external_reference: String,
    /// Card statement text.
    pub statement_descriptor: String,
    /// Payment method policy.
    pub payment_methods: PaymentMethods,
}

impl PreferenceRequest {
    /// Sum of all lines, `None` on overflow.
    #[must_use]
    pub fn total(&self) -> Option<Decimal> {
        checked_subtotal(&self.items)
    }
}

fn checked_subtotal(lines: &[PreferenceItem]) -> Option<Decimal> {
    lines.iter().try_fold(Decimal::ZERO, |sum, line| {
        line.unit_price
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|amount| sum.checked_add(amount))
    })
}

/// Builds [`PreferenceRequest`]s in a fixed currency.
#[derive(Debug, Clone)]
pub struct PreferenceBuilder {
    currency: String,
}

impl PreferenceBuilder {
    /// Creates a builder pricing items in `currency`.
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }

    /// Builds the preference for one checkout attempt.
    ///
    /// Items with a non-positive price or quantity are dropped with a
    /// warning. The difference between `total_amount` and the surviving
    /// subtotal becomes a delivery-fee line when positive; a negative
    /// difference is only logged.
    ///
    /// # Errors
    ///
    /// [`PaymentError::NoValidItems`] when nothing survives filtering, and
    /// [`PaymentError::InvalidRequest`] when `client_base_url` is not an
    /// absolute http(s) URL.
    pub fn build(
        &self,
        order_id: &str,
        items: &[LineItem],
        total_amount: Decimal,
        merchant_name: &str,
        client_base_url: &str,
    ) -> Result<PreferenceRequest, PaymentError> {
        let base_url = parse_base_url(client_base_url)?;

        let mut lines = Vec::with_capacity(items.len() + 1);
        for item in items {
            if let Some(line) = self.line(order_id, item)? {
                lines.push(line);
            }
        }
        if lines.is_empty() {
            return Err(PaymentError::NoValidItems);
        }

        let subtotal = checked_subtotal(&lines).ok_or_else(|| {
            PaymentError::InvalidRequest("cart subtotal is out of range".into())
        })?;
        let delivery_fee = round_cents(total_amount)
            .checked_sub(subtotal)
            .ok_or_else(|| PaymentError::InvalidRequest("totalAmount is out of range".into()))?;
        if delivery_fee > Decimal::ZERO {
            lines.push(PreferenceItem {
                title: DELIVERY_FEE_TITLE.to_owned(),
                quantity: 1,
                unit_price: delivery_fee,
                currency_id: self.currency.clone(),
            });
        } else if delivery_fee < Decimal::ZERO {
            tracing::warn!(
                order_id,
                %total_amount,
                %subtotal,
                %delivery_fee,
                "order total is below the item subtotal"
            );
        }

        Ok(PreferenceRequest {
            items: lines,
            back_urls: BackUrls {
                success: redirect_url(&base_url, order_id, Outcome::Approved),
                pending: redirect_url(&base_url, order_id, Outcome::Pending),
                failure: redirect_url(&base_url, order_id, Outcome::Failure),
            },
            auto_return: "approved".to_owned(),
            external_reference: order_id.to_owned(),
            statement_descriptor: statement_descriptor(merchant_name),
            payment_methods: PaymentMethods {
                excluded_payment_types: vec![PaymentTypeRef {
                    id: EXCLUDED_PAYMENT_TYPE.to_owned(),
                }],
                installments: 1,
            },
        })
    }

    /// `Ok(None)` drops the item; a quantity too large to send is refused.
    fn line(
        &self,
        order_id: &str,
        item: &LineItem,
    ) -> Result<Option<PreferenceItem>, PaymentError> {
        let unit_price = round_cents(item.unit_price);
        if item.quantity <= 0 || unit_price <= Decimal::ZERO {
            tracing::warn!(
                order_id,
                title = %item.title,
                quantity = item.quantity,
                unit_price = %item.unit_price,
                "dropping invalid cart item"
            );
            return Ok(None);
        }
        let quantity = u32::try_from(item.quantity).map_err(|_| {
            PaymentError::InvalidRequest(format!(
                "quantity {} of '{}' is too large",
                item.quantity,
                item.title.trim()
            ))
        })?;
        Ok(Some(PreferenceItem {
            title: item.title.trim().to_owned(),
            quantity,
            unit_price,
            currency_id: self.currency.clone(),
        }))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, PaymentError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PaymentError::InvalidRequest(format!("clientBaseUrl '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PaymentError::InvalidRequest(format!(
            "clientBaseUrl '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

/// Page the browser lands on after leaving the provider checkout.
#[must_use]
pub fn redirect_url(base: &Url, order_id: &str, outcome: Outcome) -> String {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("checkout").push("result");
    }
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("order_id", order_id)
        .append_pair("outcome", outcome.as_str());
    url.into()
}

/// Provider-safe statement descriptor for a merchant name.
///
/// Diacritics are folded, everything except ASCII letters, digits and single
/// inner spaces is removed, and the result is upper-cased and cut to
/// [`DESCRIPTOR_MAX_LEN`]. Never empty.
#[must_use]
pub fn statement_descriptor(merchant_name: &str) -> String {
    let mut descriptor = String::with_capacity(DESCRIPTOR_MAX_LEN);
    let mut gap = false;
    for c in merchant_name.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if gap && !descriptor.is_empty() {
                descriptor.push(' ');
            }
            gap = false;
            descriptor.push(c.to_ascii_uppercase());
        } else if c.is_whitespace() {
            gap = true;
        }
        if descriptor.len() >= DESCRIPTOR_MAX_LEN {
            break;
        }
    }
    descriptor.truncate(DESCRIPTOR_MAX_LEN);
    let descriptor = descriptor.trim_end();
    if descriptor.is_empty() {
        DESCRIPTOR_FALLBACK.to_owned()
    } else {
        descriptor.to_owned()
    }
}
