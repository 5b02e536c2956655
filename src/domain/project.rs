use crate::domain::money::{Amount, Balance};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A crowdfunding project receiving contributions.
///
/// Owned by the platform; this crate only reads it and increments the raised
/// amount when a contribution is credited.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Project {
    pub id: u64,
    pub title: String,
    pub owner_id: u64,
    pub target_amount: Decimal,
    #[serde(default)]
    pub current_amount: Balance,
}

/// Funding progress shown alongside a transaction status.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ProjectProgress {
    pub title: String,
    pub current_amount: Decimal,
    pub target_amount: Decimal,
    pub progress_percent: Decimal,
}

impl Project {
    pub fn new(id: u64, title: impl Into<String>, owner_id: u64, target_amount: Decimal) -> Self {
        Self {
            id,
            title: title.into(),
            owner_id,
            target_amount,
            current_amount: Balance::ZERO,
        }
    }

    /// Credits a contribution to the raised amount.
    pub fn credit(&mut self, amount: Amount) {
        self.current_amount += amount.into();
    }

    pub fn progress(&self) -> ProjectProgress {
        let progress_percent = if self.target_amount > Decimal::ZERO {
            (self.current_amount.value() / self.target_amount * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        } else {
            Decimal::ZERO
        };
        ProjectProgress {
            title: self.title.clone(),
            current_amount: self.current_amount.value(),
            target_amount: self.target_amount,
            progress_percent,
        }
    }
}
