use crate::url::extension_for;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Metadata about one downloaded resource
///
/// Created once, after a successful download, and owned by the history store
/// entry it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Hex digest of the resolved source URL; dedup key and filename stem
    pub content_hash: String,
    pub source_url: String,
    /// Text captured with the owning container's info-text selector
    pub description: String,
    pub extension: String,
}

impl ResourceInfo {
    /// Builds the record for a resource fetched from `source_url`
    pub fn new(source_url: &Url, description: &str, default_suffix: &str) -> Self {
        Self {
            content_hash: content_hash(source_url),
            source_url: source_url.to_string(),
            description: description.to_string(),
            extension: extension_for(source_url, default_suffix),
        }
    }

    /// `{content_hash}.{extension}`, the name the bytes are stored under
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.content_hash, self.extension)
    }
}

impl fmt::Display for ResourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{hash: {}, url: {}, ext: {}, info: {:?}}}",
            self.content_hash, self.source_url, self.extension, self.description
        )
    }
}

/// Computes the content address of a resolved resource URL (SHA-256, hex)
pub fn content_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
