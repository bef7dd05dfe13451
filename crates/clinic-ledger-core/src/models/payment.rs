//! Payments, allocations and refunds.

use serde::{Deserialize, Serialize};

/// How a payment was tendered. Only cash touches the drawer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    Insurance,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::MobileMoney,
        PaymentMethod::BankTransfer,
        PaymentMethod::Insurance,
    ];

    pub fn is_cash(self) -> bool {
        self == PaymentMethod::Cash
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Insurance => "insurance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "insurance" => Some(PaymentMethod::Insurance),
            _ => None,
        }
    }
}

/// Money received from (or on behalf of) a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    pub patient_id: String,
    /// Shift the payment was taken on. Always set for cash.
    pub shift_id: Option<String>,
    pub received_by: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Sum of live allocations
    pub allocated_cents: i64,
    /// Sum of refunds issued against this payment
    pub refunded_cents: i64,
    /// Card slip / transaction / claim reference
    pub reference: Option<String>,
    pub received_at: String,
}

impl Payment {
    pub fn new(
        patient_id: String,
        received_by: String,
        method: PaymentMethod,
        amount_cents: i64,
    ) -> Self {
        Self {
            payment_id: super::new_id(),
            patient_id,
            shift_id: None,
            received_by,
            method,
            amount_cents,
            allocated_cents: 0,
            refunded_cents: 0,
            reference: None,
            received_at: super::now_timestamp(),
        }
    }

    /// Credit not yet applied to any charge.
    pub fn unallocated_cents(&self) -> i64 {
        (self.amount_cents - self.refunded_cents - self.allocated_cents).max(0)
    }

    /// Amount that may still be refunded.
    pub fn refundable_cents(&self) -> i64 {
        (self.amount_cents - self.refunded_cents).max(0)
    }
}

/// Links a payment to a charge it settles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAllocation {
    pub allocation_id: String,
    pub payment_id: String,
    pub charge_id: String,
    pub amount_cents: i64,
    pub allocated_at: String,
}

impl PaymentAllocation {
    pub fn new(payment_id: String, charge_id: String, amount_cents: i64) -> Self {
        Self {
            allocation_id: super::new_id(),
            payment_id,
            charge_id,
            amount_cents,
            allocated_at: super::now_timestamp(),
        }
    }
}

/// Money returned against a payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub refund_id: String,
    pub payment_id: String,
    /// Refunding user's shift (cash refunds leave that drawer)
    pub shift_id: Option<String>,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reason: String,
    pub refunded_by: String,
    pub refunded_at: String,
}

impl Refund {
    pub fn new(
        payment: &Payment,
        amount_cents: i64,
        reason: String,
        refunded_by: String,
    ) -> Self {
        Self {
            refund_id: super::new_id(),
            payment_id: payment.payment_id.clone(),
            shift_id: None,
            method: payment.method,
            amount_cents,
            reason,
            refunded_by,
            refunded_at: super::now_timestamp(),
        }
    }
}
