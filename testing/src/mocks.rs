//! Deterministic stand-ins for the non-store providers.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use storefront_core::{
    Clock, OrderNumber, PaymentDetails, PaymentGateway, PaymentOutcome, PaymentReceipt, Result,
    StoreError, UserDirectory, UserId, UserRecord,
};

/// A clock pinned to an explicit instant, advanced manually.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Clock pinned to `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    /// Pin the clock to a new instant.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|p| *p.into_inner())
    }
}

/// A user directory backed by a fixed map.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<UserId, UserRecord>,
}

impl StaticUserDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.users.insert(user.id, user);
        self
    }

    /// Add a plain (non-admin) user with just an id and email.
    #[must_use]
    pub fn with_plain_user(self, id: i64, email: &str) -> Self {
        self.with_user(UserRecord {
            id: UserId(id),
            email: email.to_string(),
            name: None,
            is_admin: false,
        })
    }
}

impl UserDirectory for StaticUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<UserRecord> {
        self.users.get(&id).cloned().ok_or(StoreError::UserNotFound)
    }
}

/// A payment gateway that resolves instantly and deterministically, recording
/// every charge and refund for assertions.
#[derive(Default)]
pub struct InstantGateway {
    decline_reason: Option<String>,
    fail_refunds: bool,
    charges: Mutex<Vec<PaymentReceipt>>,
    refunds: Mutex<Vec<PaymentReceipt>>,
}

impl InstantGateway {
    /// Gateway that approves every charge.
    #[must_use]
    pub fn approving() -> Self {
        Self::default()
    }

    /// Gateway that declines every charge with `reason`.
    #[must_use]
    pub fn declining(reason: &str) -> Self {
        Self {
            decline_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Make every refund call fail with an infrastructure error.
    #[must_use]
    pub fn with_failing_refunds(mut self) -> Self {
        self.fail_refunds = true;
        self
    }

    /// Receipts of every approved charge so far.
    #[must_use]
    pub fn charges(&self) -> Vec<PaymentReceipt> {
        self.charges.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Receipts of every refund so far.
    #[must_use]
    pub fn refunds(&self) -> Vec<PaymentReceipt> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl PaymentGateway for InstantGateway {
    fn validate(&self, details: &PaymentDetails) -> Result<()> {
        if details.method.trim().is_empty() {
            return Err(StoreError::Validation(
                "Payment method is required".to_string(),
            ));
        }
        Ok(())
    }

    async fn process(
        &self,
        order_number: &OrderNumber,
        amount_cents: i64,
        _details: &PaymentDetails,
    ) -> Result<PaymentOutcome> {
        if let Some(reason) = &self.decline_reason {
            return Ok(PaymentOutcome::Declined {
                reason: reason.clone(),
            });
        }
        let receipt = PaymentReceipt {
            transaction_id: format!("TXN-TEST-{order_number}"),
            amount_cents,
        };
        if let Ok(mut charges) = self.charges.lock() {
            charges.push(receipt.clone());
        }
        Ok(PaymentOutcome::Approved(receipt))
    }

    async fn refund(&self, transaction_id: &str, amount_cents: i64) -> Result<PaymentReceipt> {
        if self.fail_refunds {
            return Err(StoreError::Database(
                "refund endpoint unavailable".to_string(),
            ));
        }
        let receipt = PaymentReceipt {
            transaction_id: transaction_id.to_string(),
            amount_cents,
        };
        if let Ok(mut refunds) = self.refunds.lock() {
            refunds.push(receipt.clone());
        }
        Ok(receipt)
    }
}
