//! Opaque cursor tokens.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A boundary row in the directory's `(sort_key, id)` total order.
///
/// Encodes to a URL-safe token; decoding exactly inverts encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The boundary row's sort key (the member's username).
    pub sort_key: String,
    /// The boundary row's numeric ID, breaking ties between equal sort
    /// keys.
    pub id: i64,
}

/// Returned when a cursor token cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cursor token")]
pub struct CursorError;

impl Cursor {
    /// Create a cursor for the given boundary.
    #[must_use]
    pub fn new(sort_key: impl Into<String>, id: i64) -> Self {
        Self {
            sort_key: sort_key.into(),
            id,
        }
    }

    /// Encode as a URL-safe token.
    #[must_use]
    pub fn encode(&self) -> String {
        // compact JSON, then URL-safe base64
        let json = serde_json::to_vec(self).expect("cursor serialization is infallible");
        URL_SAFE.encode(json)
    }

    /// Decode a token produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Fails with [`CursorError`] on anything that is not a well-formed
    /// token.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE.decode(token).map_err(|_| CursorError)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError)
    }
}
