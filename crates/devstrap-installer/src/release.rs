use devstrap_core::{normalize_version_tag, RemoteRelease, StepError};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Looks up the newest published release of a repository.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: Client,
    api_base: String,
}

impl ReleaseResolver {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn latest_release_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repo)
    }

    /// Returns the bare version of the latest release (`v1.2.3` -> `1.2.3`).
    /// No retries; the caller decides what a failure means.
    pub fn resolve_latest(&self, repo: &str) -> Result<String, StepError> {
        let url = self.latest_release_url(repo);
        debug!(%url, "fetching latest release metadata");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = github_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|err| resolution_error(repo, err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(resolution_error(repo, format!("HTTP {status} from {url}")));
        }

        let body = response
            .text()
            .map_err(|err| resolution_error(repo, format!("failed to read response: {err}")))?;
        parse_latest_version(repo, &body)
    }

    pub fn fetch_release(
        &self,
        repo: &str,
        url_template: &str,
    ) -> Result<RemoteRelease, StepError> {
        let version = self.resolve_latest(repo)?;
        let release = RemoteRelease::from_template(repo, url_template, &version);
        debug!(%repo, version = %release.version, url = %release.url, "resolved release");
        Ok(release)
    }
}

pub fn parse_latest_version(repo: &str, body: &str) -> Result<String, StepError> {
    let release: LatestRelease = serde_json::from_str(body)
        .map_err(|err| resolution_error(repo, format!("malformed release metadata: {err}")))?;
    let tag = release
        .tag_name
        .filter(|tag| !tag.trim().is_empty())
        .ok_or_else(|| resolution_error(repo, "release metadata has no tag_name"))?;
    normalize_version_tag(&tag)
        .ok_or_else(|| resolution_error(repo, format!("tag '{tag}' carries no version number")))
}

fn github_token() -> Option<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn resolution_error(repo: &str, reason: impl Into<String>) -> StepError {
    StepError::Resolution {
        repo: repo.to_string(),
        reason: reason.into(),
    }
}
