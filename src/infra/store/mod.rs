// Record store implementations.
//
// Both stores paginate by sorting on record id and cursoring past the last
// id of the previous page, wrapped in base64 so callers treat tokens as
// opaque. The cursors survive process restarts, which is what makes sweeps
// restartable.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::InMemoryRecordStore;
pub use sqlite_store::SqliteRecordStore;

use crate::core::moderation::StoreError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Wrap the last-seen record id into an opaque continuation token.
pub(crate) fn encode_cursor(last_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_id)
}

/// Unwrap a continuation token back into the last-seen record id.
pub(crate) fn decode_cursor(token: &str) -> Result<String, StoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| StoreError::InvalidQuery(format!("malformed continuation token: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| StoreError::InvalidQuery(format!("malformed continuation token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        let token = encode_cursor("rec-42");
        assert_eq!(decode_cursor(&token).unwrap(), "rec-42");
    }

    #[test]
    fn garbage_token_is_an_invalid_query() {
        assert!(matches!(
            decode_cursor("!!! not base64 !!!"),
            Err(StoreError::InvalidQuery(_))
        ));
    }
}
