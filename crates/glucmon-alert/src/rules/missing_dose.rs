use chrono::Duration;
use glucmon_common::types::{AlertLabel, Dose, DoseCategory};

/// Fires when no dose of `category` appears in the window being checked.
#[derive(Debug, Clone)]
pub struct MissingDoseRule {
    pub label: AlertLabel,
    pub category: DoseCategory,
    pub window: Duration,
}

impl MissingDoseRule {
    pub fn slow_insulin(window: Duration) -> Self {
        Self {
            label: AlertLabel::MissingSlowInsulin,
            category: DoseCategory::Slow,
            window,
        }
    }

    /// `doses` must already be limited to the rule's window.
    pub fn evaluate(&self, doses: &[Dose]) -> Option<String> {
        if doses.iter().any(|d| d.category == self.category) {
            return None;
        }
        Some(format!(
            "no {} insulin logged in the last {} hours",
            self.category,
            self.window.num_hours()
        ))
    }
}
