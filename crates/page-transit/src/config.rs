//! Engine configuration loading and resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{TransitError, TransitResult};

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "PAGE_TRANSIT_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".page-transit.json";

/// Options consumed by the fetcher, the replacer and the event trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransitConfig {
    /// URL the live document was loaded from; relative URLs resolve against it.
    pub base_url: Url,
    /// Default container selectors swapped on every transition.
    pub containers: Vec<String>,
    /// Headers merged into every request.
    pub request_headers: BTreeMap<String, String>,
    /// Default request timeout in milliseconds, 0 for none.
    pub timeout_ms: u64,
    /// Namespace of the custom document events.
    pub event_prefix: String,
}

impl Default for TransitConfig {
    fn default() -> Self {
        let mut request_headers = BTreeMap::new();
        request_headers.insert("X-Requested-With".to_string(), "page-transit".to_string());
        request_headers.insert(
            "Accept".to_string(),
            "text/html, application/xhtml+xml".to_string(),
        );

        Self {
            base_url: default_base_url(),
            containers: vec!["#transit".to_string()],
            request_headers,
            timeout_ms: 0,
            event_prefix: "transit".to_string(),
        }
    }
}

impl TransitConfig {
    /// Default config rooted at `base_url`.
    pub fn with_base_url(base_url: &str) -> TransitResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| TransitError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            base_url,
            ..Self::default()
        })
    }

    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> TransitResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the resolved config file, or defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> TransitResult<Self> {
        match resolve_config_path(explicit) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Default request timeout.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    fn validate(&self) -> TransitResult<()> {
        if self.base_url.cannot_be_a_base() {
            return Err(TransitError::Config(format!(
                "baseUrl cannot be used as a base: {}",
                self.base_url
            )));
        }
        if self.event_prefix.is_empty() {
            return Err(TransitError::Config("eventPrefix must not be empty".into()));
        }
        Ok(())
    }
}

/// Resolve the config file path: explicit path, then the environment
/// variable, then a config file in the working directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    local.exists().then_some(local)
}

fn default_base_url() -> Url {
    Url::parse("http://localhost/").unwrap_or_else(|_| unreachable!("static URL parses"))
}
