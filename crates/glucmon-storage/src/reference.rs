use glucmon_common::reference::matches;
use glucmon_common::types::Record;

use crate::{Category, Result, StorageError};

/// Finds the single record among `candidates` whose short hash equals `token`.
///
/// Zero matches is `NotFound`; more than one is `AmbiguousReference`. The
/// result never depends on the order of `candidates`.
pub fn resolve_reference<R: Record>(
    category: Category,
    token: &str,
    candidates: &[R],
) -> Result<String> {
    let mut found = candidates.iter().filter(|r| matches(token, r.id()));
    match (found.next(), found.count()) {
        (None, _) => Err(StorageError::NotFound {
            category,
            id: token.to_string(),
        }),
        (Some(record), 0) => Ok(record.id().to_string()),
        (Some(_), rest) => Err(StorageError::AmbiguousReference {
            category,
            token: token.to_string(),
            matches: rest + 1,
        }),
    }
}
