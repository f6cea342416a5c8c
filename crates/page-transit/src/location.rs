//! URL normalization shared by the cache and the fetcher.
//!
//! Every URL entering the engine is resolved against the configured base and
//! reduced to a canonical key. Same-origin URLs collapse to `path?query`;
//! fragments never take part in page identity.

use url::{Position, Url};

use crate::types::{TransitError, TransitResult};

/// A resolved URL with its normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    resolved: Url,
    same_origin: bool,
}

impl Location {
    /// Resolve `input` (absolute or relative) against `base`.
    pub fn from_url(input: &str, base: &Url) -> TransitResult<Self> {
        let resolved = base
            .join(input.trim())
            .map_err(|e| TransitError::InvalidUrl(format!("{input}: {e}")))?;
        let same_origin = resolved.origin() == base.origin();
        Ok(Self {
            resolved,
            same_origin,
        })
    }

    /// Normalized URL used as cache key and identity.
    pub fn url(&self) -> String {
        if self.same_origin {
            self.resolved[Position::BeforePath..Position::AfterQuery].to_string()
        } else {
            self.resolved[..Position::AfterQuery].to_string()
        }
    }

    /// Absolute URL without fragment, as sent over the network.
    pub fn href(&self) -> String {
        self.resolved[..Position::AfterQuery].to_string()
    }

    /// The dropped fragment, without the leading `#`.
    pub fn hash(&self) -> Option<&str> {
        self.resolved.fragment()
    }

    pub fn is_same_origin(&self) -> bool {
        self.same_origin
    }
}

/// Normalize `input` against `base`.
pub fn normalize_url(input: &str, base: &Url) -> TransitResult<String> {
    Location::from_url(input, base).map(|location| location.url())
}
