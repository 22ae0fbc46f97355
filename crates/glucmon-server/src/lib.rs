pub mod api;
pub mod chart;
pub mod commands;
pub mod config;
pub mod description;
pub mod display;
pub mod driver;
pub mod fetcher;
pub mod logging;
pub mod mutation;
pub mod report;
pub mod state;

use glucmon_storage::{DoseStore, FileStore, IntakeStore, ReadingStore};

/// Store capabilities the live display reads from.
pub trait DisplayStore: ReadingStore + DoseStore + IntakeStore + FileStore {}

impl<T: ReadingStore + DoseStore + IntakeStore + FileStore + ?Sized> DisplayStore for T {}

/// Store capabilities user commands write through.
pub trait MutationStore: DoseStore + IntakeStore {}

impl<T: DoseStore + IntakeStore + ?Sized> MutationStore for T {}

/// Store capabilities reports aggregate over.
pub trait ReportStore: ReadingStore + DoseStore + IntakeStore + FileStore {}

impl<T: ReadingStore + DoseStore + IntakeStore + FileStore + ?Sized> ReportStore for T {}
