//! The embedder's http plumbing: a single client constructor plus
//! GITHUB_TOKEN-aware fetch helpers and latest-release discovery.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;

use crate::errors::{BinstallError, BinstallResult};

/// Placeholder for caller-tunable http options.
///
/// Holds nothing yet: the client is fully determined by the environment
/// (GITHUB_TOKEN, proxy variables reqwest reads itself) and a fixed user
/// agent. It only gives `create_client` a signature that can grow knobs
/// (timeouts, mirrors) without touching call sites.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {}

impl ClientSettings {
    /// The (currently empty) default settings
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build the blocking client every embedder download goes through, so all
/// requests carry the same `binstaller/<version>` user agent
pub fn create_client(ClientSettings {}: &ClientSettings) -> BinstallResult<Client> {
    let client = Client::builder()
        .user_agent(concat!("binstaller/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// The GITHUB_TOKEN of the environment, if any
pub fn github_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|token| !token.is_empty())
}

fn auth_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = github_token() {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    headers
}

/// GET a url as text, failing on any non-2xx status
pub fn fetch_text(client: &Client, url: &str) -> BinstallResult<String> {
    let response = client.get(url).headers(auth_headers()).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(BinstallError::HttpStatus {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }
    Ok(response.text()?)
}

/// GET a url as bytes; `Ok(None)` on 404, an error on any other failure
pub fn fetch_bytes(client: &Client, url: &str) -> BinstallResult<Option<Vec<u8>>> {
    let response = client.get(url).headers(auth_headers()).send()?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(BinstallError::HttpStatus {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }
    Ok(Some(response.bytes()?.to_vec()))
}

/// Resolve the tag of a repo's latest release.
///
/// With a GITHUB_TOKEN we ask the API directly; without one we rely on the
/// `releases/latest` redirect answering `Accept: application/json`, which
/// works unauthenticated and is what the generated scripts do too.
pub fn latest_release_tag(client: &Client, repo: &str) -> BinstallResult<String> {
    let url = if github_token().is_some() {
        format!("https://api.github.com/repos/{repo}/releases/latest")
    } else {
        format!("https://github.com/{repo}/releases/latest")
    };
    let response = client
        .get(&url)
        .headers(auth_headers())
        .header(ACCEPT, "application/json")
        .send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(BinstallError::HttpStatus {
            url,
            status: status.as_u16(),
        });
    }
    let json: serde_json::Value = response.json()?;
    json.get("tag_name")
        .and_then(|tag| tag.as_str())
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| BinstallError::NoLatestRelease {
            repo: repo.to_owned(),
        })
}
