//! The payment gateway seam.

use crate::error::Result;
use crate::order::OrderNumber;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Payment instrument details as submitted by the client.
///
/// Card fields are optional because non-card methods (pay on delivery, bank
/// transfer) carry none; [`PaymentGateway::validate`] decides which fields a
/// method requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Payment method label, e.g. `"card"`.
    pub method: String,
    /// Card number, digits and separators.
    pub card_number: Option<String>,
    /// Card expiry, `MM/YY`.
    pub expiry: Option<String>,
    /// Card verification value.
    pub cvv: Option<String>,
    /// Skip the randomized failure roll and approve (manual testing hook;
    /// real gateways ignore it).
    #[serde(default)]
    pub force_success: bool,
}

/// Proof of a settled charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Gateway-issued transaction identifier.
    pub transaction_id: String,
    /// Amount charged, in cents.
    pub amount_cents: i64,
}

/// The gateway's verdict. A decline is an outcome, not an error: the order
/// stays untouched and the client may retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// The charge went through.
    Approved(PaymentReceipt),
    /// The charge was declined.
    Declined {
        /// Gateway-supplied reason.
        reason: String,
    },
}

/// A payment processor. The async methods return named `Send` futures so
/// generic callers stay `Send`; implementations use `async fn`.
pub trait PaymentGateway: Send + Sync {
    /// Field-level validation of the payment details, before any charge is
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Validation`] naming the first invalid
    /// field.
    fn validate(&self, details: &PaymentDetails) -> Result<()>;

    /// Attempt the charge. Resolves exactly once per call; the gateway never
    /// retries on its own.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] only for transport-level
    /// failures; a declined charge is the `Ok(PaymentOutcome::Declined)`
    /// outcome.
    fn process(
        &self,
        order_number: &OrderNumber,
        amount_cents: i64,
        details: &PaymentDetails,
    ) -> impl Future<Output = Result<PaymentOutcome>> + Send;

    /// Return a settled charge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Validation`] for an unknown transaction
    /// id or a non-positive amount.
    fn refund(
        &self,
        transaction_id: &str,
        amount_cents: i64,
    ) -> impl Future<Output = Result<PaymentReceipt>> + Send;
}
