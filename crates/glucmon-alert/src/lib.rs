//! Alert analysis over stored readings and doses.
//!
//! Each run evaluates the glucose thresholds against the newest reading and
//! checks that slow-acting insulin was logged recently. Suppression state is
//! not kept in memory: a condition re-fires only when no alert with the same
//! label was persisted within its suppression window.

pub mod engine;
pub mod rules;


use glucmon_storage::{AlertStore, DoseStore, ReadingStore};

/// Store capabilities the analyzer needs.
pub trait AnalyzerStore: ReadingStore + DoseStore + AlertStore {}

impl<T: ReadingStore + DoseStore + AlertStore + ?Sized> AnalyzerStore for T {}
