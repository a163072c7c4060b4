use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    booking::PaymentStatus,
    payment::{Payment, PaymentRecordStatus},
};

/// A charge handed to the provider when a client starts paying.
#[derive(Debug, Clone)]
pub struct ChargeRequest<'a> {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub phone: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub transaction_id: String,
    pub status: PaymentRecordStatus,
    pub message: String,
}

/// Seam between the payment workflow and whatever confirms money moved.
/// Booking reconciliation reads its target states from here so a real
/// gateway can replace the simulation without touching booking logic.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Stored in `payments.payment_method`.
    fn method(&self) -> &'static str;

    async fn initiate(&self, charge: &ChargeRequest<'_>) -> anyhow::Result<ChargeOutcome>;

    /// Current status of a payment previously initiated with this provider.
    async fn check_status(&self, payment: &Payment) -> anyhow::Result<PaymentRecordStatus>;

    /// Booking payment status written as soon as a charge is initiated.
    fn booking_status_on_initiate(&self) -> PaymentStatus;

    fn booking_status_on_complete(&self) -> PaymentStatus {
        PaymentStatus::Paid
    }
}

/// Stand-in mobile-money provider: every charge is accepted and the first
/// status check reports it completed.
#[derive(Debug, Default, Clone)]
pub struct SimulatedMobileMoney;

impl SimulatedMobileMoney {
    pub fn transaction_id() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| char::from(c).to_ascii_uppercase())
            .collect();
        format!("MP{}{}", Utc::now().format("%y%m%d%H%M%S"), suffix)
    }
}

#[async_trait]
impl PaymentProvider for SimulatedMobileMoney {
    fn method(&self) -> &'static str {
        "mpesa"
    }

    async fn initiate(&self, charge: &ChargeRequest<'_>) -> anyhow::Result<ChargeOutcome> {
        tracing::debug!(booking_id = %charge.booking_id, amount = %charge.amount, "simulated charge");
        Ok(ChargeOutcome {
            transaction_id: Self::transaction_id(),
            status: PaymentRecordStatus::Processing,
            message: format!("Payment request sent to {}", charge.phone),
        })
    }

    async fn check_status(&self, payment: &Payment) -> anyhow::Result<PaymentRecordStatus> {
        Ok(match payment.status {
            PaymentRecordStatus::Processing => PaymentRecordStatus::Completed,
            settled => settled,
        })
    }

    // Marks the booking partially paid before any confirmation arrives.
    fn booking_status_on_initiate(&self) -> PaymentStatus {
        PaymentStatus::Partial
    }
}
