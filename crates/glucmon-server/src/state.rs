use crate::commands::CommandHandler;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandHandler>,
    /// Hex ed25519 key used to verify interaction requests. Unsigned requests
    /// are accepted only when this is unset.
    pub public_key: Option<Arc<String>>,
    pub start_time: DateTime<Utc>,
}
