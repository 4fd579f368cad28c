//! What a curl resume token carries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::ResumeToken;

/// Partial transfer left on disk by a suspended transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResumeData {
    pub url: String,
    pub partial_path: PathBuf,
    /// Bytes of the body already in `partial_path`.
    pub offset: u64,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl ResumeData {
    pub fn encode(&self) -> ResumeToken {
        // Plain struct of strings and integers; serialization cannot fail.
        ResumeToken::new(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(token: &ResumeToken) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(token.as_bytes())
    }

    /// Validator for `If-Range`; strong entity tags are preferred over dates.
    pub fn if_range(&self) -> Option<&str> {
        match &self.etag {
            Some(tag) if !tag.starts_with("W/") => Some(tag),
            _ => self.last_modified.as_deref(),
        }
    }

    pub fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.partial_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %self.partial_path.display(), "discard partial: {}", e);
            }
        }
    }
}
