use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single posting as normalized by a feed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Zero means the posting did not state a budget.
    pub budget: f64,
    pub client_verified: bool,
    pub client_spent: f64,
}

impl JobRecord {
    pub fn budget_display(&self) -> String {
        if self.budget > 0.0 {
            format!("${}", self.budget)
        } else {
            "Not specified".to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BudgetCategory {
    QuickWins,
    MediumProjects,
    HighValue,
}

impl BudgetCategory {
    /// Board order, left to right.
    pub const ALL: [BudgetCategory; 3] = [
        BudgetCategory::QuickWins,
        BudgetCategory::MediumProjects,
        BudgetCategory::HighValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetCategory::QuickWins => "quick_wins",
            BudgetCategory::MediumProjects => "medium_projects",
            BudgetCategory::HighValue => "high_value",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BudgetCategory::QuickWins => "Quick Wins",
            BudgetCategory::MediumProjects => "Medium Projects",
            BudgetCategory::HighValue => "High Value",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            BudgetCategory::QuickWins => "⚡",
            BudgetCategory::MediumProjects => "📊",
            BudgetCategory::HighValue => "💎",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::High => "🔴",
            Priority::Medium => "🟡",
            Priority::Low => "🟢",
        }
    }
}

/// One admitted posting id, as stored in the processed-jobs file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// A categorized posting waiting for chat delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTask {
    pub record: JobRecord,
    pub category: BudgetCategory,
    pub priority: Priority,
}

/// A card as returned by the board's card listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoardCard {
    pub id: String,
    pub name: String,
    #[serde(rename = "dateLastActivity")]
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub closed: bool,
}
