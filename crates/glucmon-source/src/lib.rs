//! Remote glucose reading source.
//!
//! [`ReadingSource`] is what the fetcher consumes. [`session::ShareSession`]
//! implements it on top of any [`ShareApi`], owning the session token and
//! renewing it once when the remote side reports it expired.
//! [`dexcom::DexcomShare`] is the HTTP implementation of [`ShareApi`].

pub mod dexcom;
pub mod error;
pub mod session;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use glucmon_common::types::NewReading;

use crate::error::{Result, SourceError};

/// Largest window, in minutes, the source accepts.
pub const MAX_WINDOW_MINUTES: u32 = 1440;
/// Largest number of readings the source returns per request.
pub const MAX_WINDOW_COUNT: u32 = 288;

/// A bounded, time-ordered window of recent readings.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Readings from the last `minutes`, at most `max_count`, oldest first.
    async fn latest_readings(&self, minutes: u32, max_count: u32) -> Result<Vec<NewReading>>;
}

/// Raw account-level API of the share service.
#[async_trait]
pub trait ShareApi: Send + Sync {
    /// Logs in and returns a session id.
    async fn login(&self) -> Result<String>;

    /// Fetches readings with an existing session id, in whatever order the
    /// service returns them.
    async fn fetch(&self, session_id: &str, minutes: u32, max_count: u32)
        -> Result<Vec<NewReading>>;
}

/// Rejects windows above the source ceilings before any request is made.
pub fn check_window(minutes: u32, max_count: u32) -> Result<()> {
    if minutes > MAX_WINDOW_MINUTES || max_count > MAX_WINDOW_COUNT {
        return Err(SourceError::WindowTooLarge { minutes, max_count });
    }
    Ok(())
}
