//! Contest engine: periods, admission, winner cycles

pub mod admission;
pub mod events;
pub mod fetcher;
pub mod period;
pub mod registry;
pub mod runner;
pub mod template;
pub mod traits;
pub mod winner;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionGate, Rejection, Verdict};
pub use events::ContestEvents;
pub use period::{Period, PeriodCalculator};
pub use registry::ModuleRegistry;
pub use runner::{CycleOutcome, CycleRunner};
pub use traits::{ContentTypeProbe, ItemStore, Notifier};
