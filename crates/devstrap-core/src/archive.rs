#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    TarGz,
    Bin,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::Bin => "bin",
        }
    }

    /// Anything that is not a recognised archive extension is treated as a
    /// bare executable.
    pub fn infer_from_url(url: &str) -> Self {
        let file_name = url_file_name(url).to_ascii_lowercase();
        if file_name.ends_with(".zip") {
            return Self::Zip;
        }
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            return Self::TarGz;
        }
        Self::Bin
    }
}

/// Last path segment of a URL with query and fragment removed.
pub fn url_file_name(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    without_query.rsplit('/').next().unwrap_or("")
}
