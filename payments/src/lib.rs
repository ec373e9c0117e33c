//! Simulated payment gateway.
//!
//! Stands in for a real payment processor during development: validates card
//! details, sleeps for a bounded random latency, and approves or declines
//! with a configurable failure rate. Deterministic tests use
//! [`SimulatedGatewayConfig::with_failure_rate`]`(0.0)` and
//! [`SimulatedGatewayConfig::with_latency`]`(Duration::ZERO..)` or the
//! `force_success` flag on the request.

use chrono::{Datelike, Utc};
use rand::Rng;
use std::time::Duration;
use storefront_core::{
    OrderNumber, PaymentDetails, PaymentGateway, PaymentOutcome, PaymentReceipt, Result,
    StoreError,
};
use uuid::Uuid;

/// Tuning knobs for the simulation.
#[derive(Debug, Clone)]
pub struct SimulatedGatewayConfig {
    /// Probability in `0.0..=1.0` that a charge is declined.
    pub failure_rate: f64,
    /// Lower bound of the simulated processing latency.
    pub min_latency: Duration,
    /// Upper bound of the simulated processing latency.
    pub max_latency: Duration,
}

impl Default for SimulatedGatewayConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            min_latency: Duration::from_millis(500),
            max_latency: Duration::from_millis(1000),
        }
    }
}

impl SimulatedGatewayConfig {
    /// Override the decline probability (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Override the simulated latency window.
    #[must_use]
    pub const fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }
}

/// The simulated processor.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    config: SimulatedGatewayConfig,
}

impl SimulatedGateway {
    /// Gateway with the default simulation parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway with explicit simulation parameters.
    #[must_use]
    pub const fn with_config(config: SimulatedGatewayConfig) -> Self {
        Self { config }
    }

    async fn simulate_latency(&self) {
        let min = self.config.min_latency;
        let max = self.config.max_latency.max(min);
        let latency = if max > min {
            let spread = (max - min).as_millis() as u64;
            min + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
        } else {
            min
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn roll_decline(&self) -> bool {
        self.config.failure_rate > 0.0
            && rand::thread_rng().gen_range(0.0..1.0) < self.config.failure_rate
    }
}

impl PaymentGateway for SimulatedGateway {
    fn validate(&self, details: &PaymentDetails) -> Result<()> {
        if details.method.trim().is_empty() {
            return Err(StoreError::Validation(
                "Payment method is required".to_string(),
            ));
        }
        if !is_card_method(&details.method) {
            return Ok(());
        }
        let number = details
            .card_number
            .as_deref()
            .ok_or_else(|| StoreError::Validation("Card number is required".to_string()))?;
        validate_card_number(number)?;
        let expiry = details
            .expiry
            .as_deref()
            .ok_or_else(|| StoreError::Validation("Card expiry is required".to_string()))?;
        validate_expiry(expiry)?;
        let cvv = details
            .cvv
            .as_deref()
            .ok_or_else(|| StoreError::Validation("CVV is required".to_string()))?;
        validate_cvv(cvv)?;
        Ok(())
    }

    async fn process(
        &self,
        order_number: &OrderNumber,
        amount_cents: i64,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome> {
        if amount_cents <= 0 {
            return Err(StoreError::Validation(
                "Charge amount must be positive".to_string(),
            ));
        }
        self.simulate_latency().await;

        if !details.force_success && self.roll_decline() {
            tracing::info!(order_number = %order_number, amount_cents, "simulated decline");
            return Ok(PaymentOutcome::Declined {
                reason: "Payment declined by issuer".to_string(),
            });
        }

        let receipt = PaymentReceipt {
            transaction_id: format!("TXN-{}", Uuid::new_v4().simple()),
            amount_cents,
        };
        tracing::info!(
            order_number = %order_number,
            transaction_id = %receipt.transaction_id,
            amount_cents,
            "simulated approval"
        );
        Ok(PaymentOutcome::Approved(receipt))
    }

    async fn refund(&self, transaction_id: &str, amount_cents: i64) -> Result<PaymentReceipt> {
        if transaction_id.trim().is_empty() {
            return Err(StoreError::Validation(
                "Transaction id is required".to_string(),
            ));
        }
        if amount_cents <= 0 {
            return Err(StoreError::Validation(
                "Refund amount must be positive".to_string(),
            ));
        }
        self.simulate_latency().await;
        let receipt = PaymentReceipt {
            transaction_id: format!("RFD-{}", Uuid::new_v4().simple()),
            amount_cents,
        };
        tracing::info!(
            original = %transaction_id,
            refund = %receipt.transaction_id,
            amount_cents,
            "simulated refund"
        );
        Ok(receipt)
    }
}

fn is_card_method(method: &str) -> bool {
    matches!(method.to_ascii_lowercase().as_str(), "card" | "credit_card" | "debit_card")
}

/// Card numbers are 13 to 19 digits, separators allowed.
fn validate_card_number(number: &str) -> Result<()> {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return Err(StoreError::Validation("Invalid card number".to_string()));
    }
    let has_junk = number
        .chars()
        .any(|c| !c.is_ascii_digit() && c != ' ' && c != '-');
    if has_junk {
        return Err(StoreError::Validation("Invalid card number".to_string()));
    }
    Ok(())
}

/// Expiry is `MM/YY` and must not be in the past.
fn validate_expiry(expiry: &str) -> Result<()> {
    let invalid = || StoreError::Validation("Invalid card expiry".to_string());
    let (month, year) = expiry.split_once('/').ok_or_else(invalid)?;
    if month.len() != 2 || year.len() != 2 {
        return Err(invalid());
    }
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    let now = Utc::now();
    let year = 2000 + year;
    if year < now.year() || (year == now.year() && month < now.month()) {
        return Err(StoreError::Validation("Card has expired".to_string()));
    }
    Ok(())
}

/// CVV is 3 or 4 digits.
fn validate_cvv(cvv: &str) -> Result<()> {
    if (cvv.len() == 3 || cvv.len() == 4) && cvv.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(StoreError::Validation("Invalid CVV".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    fn card_details() -> PaymentDetails {
        PaymentDetails {
            method: "card".to_string(),
            card_number: Some("4242 4242 4242 4242".to_string()),
            expiry: Some("12/99".to_string()),
            cvv: Some("123".to_string()),
            force_success: false,
        }
    }

    fn instant_gateway(failure_rate: f64) -> SimulatedGateway {
        SimulatedGateway::with_config(
            SimulatedGatewayConfig::default()
                .with_failure_rate(failure_rate)
                .with_latency(Duration::ZERO, Duration::ZERO),
        )
    }

    #[test]
    fn valid_card_passes() {
        assert!(instant_gateway(0.0).validate(&card_details()).is_ok());
    }

    #[test]
    fn short_card_number_rejected() {
        let mut details = card_details();
        details.card_number = Some("4242".to_string());
        assert!(matches!(
            instant_gateway(0.0).validate(&details),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn expired_card_rejected() {
        let mut details = card_details();
        details.expiry = Some("01/20".to_string());
        assert!(matches!(
            instant_gateway(0.0).validate(&details),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn malformed_expiry_rejected() {
        for expiry in ["13/99", "1/99", "12-99", "12/1999", "ab/cd"] {
            let mut details = card_details();
            details.expiry = Some(expiry.to_string());
            assert!(
                instant_gateway(0.0).validate(&details).is_err(),
                "{expiry} should be rejected"
            );
        }
    }

    #[test]
    fn bad_cvv_rejected() {
        for cvv in ["12", "12345", "12a"] {
            let mut details = card_details();
            details.cvv = Some(cvv.to_string());
            assert!(
                instant_gateway(0.0).validate(&details).is_err(),
                "{cvv} should be rejected"
            );
        }
    }

    #[test]
    fn non_card_method_needs_no_card_fields() {
        let details = PaymentDetails {
            method: "bank_transfer".to_string(),
            ..PaymentDetails::default()
        };
        assert!(instant_gateway(0.0).validate(&details).is_ok());
    }

    #[tokio::test]
    async fn zero_failure_rate_always_approves() {
        let gateway = instant_gateway(0.0);
        let number = OrderNumber::generate(Utc::now());
        for _ in 0..20 {
            let outcome = gateway.process(&number, 1000, &card_details()).await.unwrap();
            assert!(matches!(outcome, PaymentOutcome::Approved(_)));
        }
    }

    #[tokio::test]
    async fn certain_failure_rate_always_declines() {
        let gateway = instant_gateway(1.0);
        let number = OrderNumber::generate(Utc::now());
        let outcome = gateway.process(&number, 1000, &card_details()).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Declined { .. }));
    }

    #[tokio::test]
    async fn force_success_overrides_failure_rate() {
        let gateway = instant_gateway(1.0);
        let number = OrderNumber::generate(Utc::now());
        let mut details = card_details();
        details.force_success = true;
        let outcome = gateway.process(&number, 1000, &details).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Approved(_)));
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let gateway = instant_gateway(0.0);
        let number = OrderNumber::generate(Utc::now());
        assert!(gateway.process(&number, 0, &card_details()).await.is_err());
    }

    #[tokio::test]
    async fn refund_requires_transaction_id_and_positive_amount() {
        let gateway = instant_gateway(0.0);
        assert!(gateway.refund("", 100).await.is_err());
        assert!(gateway.refund("TXN-abc", 0).await.is_err());
        let receipt = gateway.refund("TXN-abc", 100).await.unwrap();
        assert_eq!(receipt.amount_cents, 100);
        assert!(receipt.transaction_id.starts_with("RFD-"));
    }
}
