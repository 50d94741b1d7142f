//! Service configuration

/// How a monthly budget overrun at submission time is treated.
///
/// The reference behavior only warns; stock availability is the hard
/// submission gate. Enforcement is available for deployments that want the
/// cap to be binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetPolicy {
    #[default]
    Advisory,
    Enforced,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceConfig {
    pub budget_policy: BudgetPolicy,
}

impl ServiceConfig {
    pub fn enforced_budget() -> Self {
        Self {
            budget_policy: BudgetPolicy::Enforced,
        }
    }
}
