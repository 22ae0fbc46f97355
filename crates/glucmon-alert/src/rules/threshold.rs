use glucmon_common::types::{AlertLabel, Reading};

/// Inclusive comparison against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterEqual,
    LessEqual,
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterEqual => "≥",
            Self::LessEqual => "≤",
        }
    }
}

/// Fires when the newest reading crosses `threshold`.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub label: AlertLabel,
    pub operator: CompareOp,
    pub threshold: f64,
}

impl ThresholdRule {
    pub fn high(threshold: f64) -> Self {
        Self {
            label: AlertLabel::HighGlucose,
            operator: CompareOp::GreaterEqual,
            threshold,
        }
    }

    pub fn low(threshold: f64) -> Self {
        Self {
            label: AlertLabel::LowGlucose,
            operator: CompareOp::LessEqual,
            threshold,
        }
    }

    /// Returns the alert reason when `reading` breaches the threshold.
    pub fn evaluate(&self, reading: &Reading) -> Option<String> {
        if !self.operator.check(reading.mmol, self.threshold) {
            return None;
        }
        Some(format!(
            "current value: {:.2} {} {:.2}",
            reading.mmol,
            self.operator.symbol(),
            self.threshold
        ))
    }
}
