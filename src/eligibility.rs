//! Monthly budget eligibility
//!
//! A role's threshold caps approved-plus-pending spend inside the current
//! calendar month. The check is advisory by default: submission is not
//! blocked, but the snapshot tells the caller exactly where the employee
//! stands.

use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// The role's configured cap; `None` when no threshold is configured,
    /// which means no limit applies.
    pub max_amount: Option<Money>,
    pub approved_spend: Money,
    pub pending_spend: Money,
    /// `max_amount - approved - pending`; `None` when no cap is configured.
    /// Negative when the employee is over the cap.
    pub remaining: Option<Money>,
    pub over_threshold: bool,
}

impl Eligibility {
    pub fn evaluate(max_amount: Option<Money>, approved_spend: Money, pending_spend: Money) -> Self {
        let remaining = max_amount.map(|cap| cap - approved_spend - pending_spend);
        let over_threshold = remaining.map(|r| r.is_negative()).unwrap_or(false);
        Self {
            max_amount,
            approved_spend,
            pending_spend,
            remaining,
            over_threshold,
        }
    }
}
