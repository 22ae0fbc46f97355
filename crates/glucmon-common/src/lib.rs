//! Shared record types for the glucose telemetry bot.
//!
//! Every other crate speaks in terms of the types defined here: readings
//! ingested from the remote source, manually logged doses and intakes, and
//! the alert history used for notification suppression.

pub mod id;
pub mod reference;
pub mod types;
