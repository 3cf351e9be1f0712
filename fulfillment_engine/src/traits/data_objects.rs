use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Binding, Order, StockPool},
    helpers::Weighted,
};

/// The result of a reserve, deduct or release on the physical ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOutcome {
    /// The movement was applied. Contains the pool state afterwards.
    Applied(StockPool),
    /// A movement with the same correlation id had already been applied, so nothing changed.
    Replayed,
}

impl LedgerOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub pool_id: i64,
    pub stock_delta: i64,
    pub available_delta: i64,
    pub operator: String,
    pub reason: String,
}

/// Administrative adjustments never fail on bad input. They tell the caller why they were not applied instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustOutcome {
    Applied(StockPool),
    Rejected(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolQueryFilter {
    pub active_only: bool,
    pub low_stock_only: bool,
    pub sku: Option<String>,
}

impl PoolQueryFilter {
    pub fn active(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn low_stock(mut self) -> Self {
        self.low_stock_only = true;
        self
    }

    pub fn with_sku(mut self, sku: &str) -> Self {
        self.sku = Some(sku.to_string());
        self
    }
}

/// A binding, along with a lock-free snapshot of how much its pool can currently supply.
///
/// For physical pools `available` is the pool's available stock. For virtual pools it is the number of available
/// items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingCandidate {
    pub binding: Binding,
    pub available: i64,
    pub pool_active: bool,
}

impl Weighted for BindingCandidate {
    fn weight(&self) -> i64 {
        self.binding.priority
    }
}

/// Payment details written alongside the paid transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_method_id: Option<i64>,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub data: Option<String>,
}

impl PaymentRecord {
    pub fn manual() -> Self {
        Self { payment_method_id: None, transaction_id: None, paid_at: Utc::now(), data: None }
    }

    pub fn new(payment_method_id: i64, transaction_id: Option<String>, data: Option<String>) -> Self {
        Self { payment_method_id: Some(payment_method_id), transaction_id, paid_at: Utc::now(), data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaidTransition {
    Applied {
        order: Order,
        /// True if the order's virtual stock was delivered as part of the transition.
        auto_delivered: bool,
    },
    /// The order had already left `pending_payment`. Nothing was changed.
    AlreadyProcessed(Order),
}

impl PaidTransition {
    pub fn order(&self) -> &Order {
        match self {
            PaidTransition::Applied { order, .. } => order,
            PaidTransition::AlreadyProcessed(order) => order,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepResult {
    pub cancelled: Vec<Order>,
    /// Orders that could not be cancelled, with the reason. They are retried on the next sweep.
    pub failed: Vec<(i64, String)>,
}

impl SweepResult {
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
