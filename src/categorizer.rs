use crate::config::{BudgetTiers, Categories, PriorityThresholds};
use crate::model::{BudgetCategory, JobRecord, Priority};

/// Buckets postings by budget and client trust.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Categorizer {
    tiers: BudgetTiers,
    priority: PriorityThresholds,
}

impl Categorizer {
    pub fn new(tiers: BudgetTiers, priority: PriorityThresholds) -> Self {
        Self { tiers, priority }
    }

    pub fn from_config(categories: &Categories) -> Self {
        Self::new(categories.budget_tiers, categories.priority)
    }

    pub fn categorize(&self, record: &JobRecord) -> (BudgetCategory, Priority) {
        (self.category(record.budget), self.priority(record))
    }

    pub fn category(&self, budget: f64) -> BudgetCategory {
        if budget <= self.tiers.quick_wins {
            BudgetCategory::QuickWins
        } else if budget <= self.tiers.medium_projects {
            BudgetCategory::MediumProjects
        } else {
            BudgetCategory::HighValue
        }
    }

    // Not exhaustive: first match wins, everything else is Medium.
    pub fn priority(&self, record: &JobRecord) -> Priority {
        if record.client_verified && record.client_spent > self.priority.verified_spent_high {
            Priority::High
        } else if !record.client_verified
            && record.client_spent < self.priority.unverified_spent_low
        {
            Priority::Low
        } else {
            Priority::Medium
        }
    }
}
