//! Running version and latest published version lookup (for `GET /info`).

use serde::Deserialize;

const DEFAULT_REGISTRY_URL: &str = "https://crates.io/api/v1/crates/linegpt";

/// Placeholder reported when the registry lookup fails.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Version of the running build.
pub fn current_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("version lookup failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("version registry error: {0}")]
    Api(String),
    #[error("version registry response has no version")]
    Missing,
}

/// Fetches the latest published version from a JSON registry document.
#[derive(Clone)]
pub struct VersionClient {
    url: String,
    client: reqwest::Client,
}

impl VersionClient {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            // crates.io rejects requests without a user agent
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            client,
        }
    }

    /// GET the registry document and pull the version out of it.
    pub async fn fetch_latest(&self) -> Result<String, VersionError> {
        let res = self.client.get(&self.url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VersionError::Api(format!("{} {}", status, body)));
        }
        let doc: RegistryDocument = res.json().await?;
        doc.latest().ok_or(VersionError::Missing)
    }

    /// Like [`fetch_latest`](Self::fetch_latest) but falls back to [`UNKNOWN_VERSION`].
    pub async fn latest_or_unknown(&self) -> String {
        match self.fetch_latest().await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("latest version lookup failed: {}", e);
                UNKNOWN_VERSION.to_string()
            }
        }
    }
}

/// Either a package manifest (`{"version": ..}`) or a crates.io crate document.
#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default, rename = "crate")]
    krate: Option<CrateInfo>,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    #[serde(default)]
    max_stable_version: Option<String>,
    #[serde(default)]
    max_version: Option<String>,
}

impl RegistryDocument {
    fn latest(self) -> Option<String> {
        self.version
            .or_else(|| {
                self.krate
                    .and_then(|c| c.max_stable_version.or(c.max_version))
            })
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}
