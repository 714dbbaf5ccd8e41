/// A concrete release of a tool: the bare version and the artifact URL built
/// for it. Built per install and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    pub version: String,
    pub url: String,
}

impl RemoteRelease {
    /// Expands `{repo}` and `{version}` in `template`.
    pub fn from_template(repo: &str, template: &str, version: &str) -> Self {
        Self {
            version: version.to_string(),
            url: template
                .replace("{repo}", repo)
                .replace("{version}", version),
        }
    }
}

/// Strips every leading non-digit character from a release tag so it can be
/// interpolated into file names (`v1.2.3` -> `1.2.3`). Returns `None` when the
/// tag carries no digits at all.
pub fn normalize_version_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    let start = trimmed.find(|ch: char| ch.is_ascii_digit())?;
    Some(trimmed[start..].to_string())
}
