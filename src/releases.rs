use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;
use crate::error::{ErrorKind, Result, WandError};

const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// A published release. Only the tag is used for version discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            assets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// Lists the releases of an `owner/repo`.
pub trait ReleaseSource: Send + Sync {
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>>;
}

/// GitHub Releases API client.
///
/// Authenticates with `GITHUB_TOKEN` or `GH_TOKEN` when present.
pub struct GitHubReleases {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubReleases {
    pub fn new() -> Result<Self> {
        Self::with_api_url(GITHUB_API)
    }

    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WandError::wrap(ErrorKind::NetworkUnreachable, "Failed to create HTTP client", e))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: crate::config::github_token(),
        })
    }

    fn fetch_page(&self, owner: &str, repo: &str, page: usize) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/releases?per_page={PER_PAGE}&page={page}",
            self.api_url
        );
        debug!(%url, "Fetching releases");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().map_err(|e| {
            WandError::wrap(
                ErrorKind::NetworkUnreachable,
                format!("Failed to fetch releases for {owner}/{repo}"),
                e,
            )
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WandError::with_details(
                ErrorKind::HttpError,
                format!("Failed to fetch releases for {owner}/{repo}"),
                format!("HTTP {status}"),
            ));
        }
        response.json().map_err(|e| {
            WandError::wrap(
                ErrorKind::HttpError,
                format!("Failed to parse releases for {owner}/{repo}"),
                e,
            )
        })
    }
}

impl ReleaseSource for GitHubReleases {
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for page in 1.. {
            let batch = self.fetch_page(owner, repo, page)?;
            let last = batch.len() < PER_PAGE;
            releases.extend(batch);
            if last {
                break;
            }
        }
        Ok(releases)
    }
}

/// Splits `owner/repo`.
///
/// # Errors
/// [`ErrorKind::InvalidPath`] unless there are exactly two non-empty segments.
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    let invalid = || {
        WandError::with_details(
            ErrorKind::InvalidPath,
            "Invalid repository format",
            format!("expected owner/repo, got {repository:?}"),
        )
    };
    let mut parts = repository.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
        _ => Err(invalid()),
    }
}
