pub mod missing_dose;
pub mod threshold;
