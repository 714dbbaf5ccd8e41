use devstrap_core::{url_file_name, ArchiveType, StepError};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fs_utils::{part_path, set_executable};

/// Download, extract, locate and place a single executable.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    client: Client,
}

impl ArchiveInstaller {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Everything is staged in a private temporary directory that is removed
    /// on every exit path; only the final executable reaches `dest_dir`.
    pub fn install(
        &self,
        url: &str,
        binary_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, StepError> {
        let workspace = make_tmp_dir("archive")?;
        let file_name = match url_file_name(url) {
            "" => "artifact",
            name => name,
        };
        let archive_path = workspace.path().join(file_name);

        download_to(&self.client, url, &archive_path)?;
        install_from_archive_file(
            &archive_path,
            ArchiveType::infer_from_url(url),
            binary_name,
            &workspace.path().join("extracted"),
            dest_dir,
        )
    }
}

pub(crate) fn make_tmp_dir(label: &str) -> Result<tempfile::TempDir, StepError> {
    tempfile::Builder::new()
        .prefix(&format!("devstrap-{label}-"))
        .tempdir()
        .map_err(|err| StepError::io("failed to create temporary directory", err))
}

pub(crate) fn download_to(client: &Client, url: &str, out_path: &Path) -> Result<u64, StepError> {
    debug!(%url, path = %out_path.display(), "downloading");
    let mut response = client
        .get(url)
        .send()
        .map_err(|err| download_error(url, err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(download_error(url, format!("HTTP {status}")));
    }

    let mut file = File::create(out_path).map_err(|err| {
        StepError::io(format!("failed to create {}", out_path.display()), err)
    })?;
    let written = response
        .copy_to(&mut file)
        .map_err(|err| download_error(url, err.to_string()))?;
    debug!(%url, bytes = written, "download finished");
    Ok(written)
}

pub fn install_from_archive_file(
    archive_path: &Path,
    archive_type: ArchiveType,
    binary_name: &str,
    extract_dir: &Path,
    dest_dir: &Path,
) -> Result<PathBuf, StepError> {
    fs::create_dir_all(extract_dir).map_err(|err| {
        StepError::io(format!("failed to create {}", extract_dir.display()), err)
    })?;

    match archive_type {
        ArchiveType::TarGz => extract_tar_gz(archive_path, extract_dir)?,
        ArchiveType::Zip => extract_zip(archive_path, extract_dir)?,
        ArchiveType::Bin => {
            let staged = extract_dir.join(binary_name);
            fs::copy(archive_path, &staged).map_err(|err| {
                StepError::io(
                    format!("failed to stage {}", archive_path.display()),
                    err,
                )
            })?;
        }
    }
    debug!(
        archive = %archive_path.display(),
        kind = archive_type.as_str(),
        "extracted artifact"
    );

    let source = find_binary(extract_dir, binary_name)?.ok_or_else(|| {
        StepError::BinaryNotFound {
            binary: binary_name.to_string(),
            archive: archive_label(archive_path),
        }
    })?;
    place_binary(&source, binary_name, dest_dir)
}

fn extract_tar_gz(archive_path: &Path, extract_dir: &Path) -> Result<(), StepError> {
    let file = File::open(archive_path).map_err(|err| {
        StepError::io(format!("failed to open {}", archive_path.display()), err)
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(extract_dir)
        .map_err(|err| extract_error(archive_path, err.to_string()))
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<(), StepError> {
    let file = File::open(archive_path).map_err(|err| {
        StepError::io(format!("failed to open {}", archive_path.display()), err)
    })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| extract_error(archive_path, err.to_string()))?;
    archive
        .extract(extract_dir)
        .map_err(|err| extract_error(archive_path, err.to_string()))
}

/// Depth-first search for a regular file named `binary_name`; entries are
/// visited in name order so the pick is stable across runs.
pub(crate) fn find_binary(root: &Path, binary_name: &str) -> Result<Option<PathBuf>, StepError> {
    let mut entries = fs::read_dir(root)
        .map_err(|err| StepError::io(format!("failed to read {}", root.display()), err))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| StepError::io(format!("failed to read {}", root.display()), err))?;
    entries.sort();

    for path in entries {
        let metadata = fs::symlink_metadata(&path)
            .map_err(|err| StepError::io(format!("failed to stat {}", path.display()), err))?;
        if metadata.is_dir() {
            if let Some(found) = find_binary(&path, binary_name)? {
                return Ok(Some(found));
            }
        } else if metadata.is_file()
            && path.file_name().and_then(|name| name.to_str()) == Some(binary_name)
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn place_binary(source: &Path, binary_name: &str, dest_dir: &Path) -> Result<PathBuf, StepError> {
    fs::create_dir_all(dest_dir)
        .map_err(|err| StepError::io(format!("failed to create {}", dest_dir.display()), err))?;

    let destination = dest_dir.join(binary_name);
    let part = part_path(&destination);
    let staged = fs::copy(source, &part)
        .and_then(|_| set_executable(&part))
        .and_then(|()| fs::rename(&part, &destination));
    if let Err(err) = staged {
        let _ = fs::remove_file(&part);
        return Err(StepError::io(
            format!("failed to place {}", destination.display()),
            err,
        ));
    }

    debug!(binary = %destination.display(), "placed executable");
    Ok(destination)
}

fn archive_label(archive_path: &Path) -> String {
    archive_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("archive")
        .to_string()
}

fn download_error(url: &str, reason: String) -> StepError {
    StepError::Download {
        url: url.to_string(),
        reason,
    }
}

fn extract_error(archive_path: &Path, reason: String) -> StepError {
    StepError::Extract {
        archive: archive_label(archive_path),
        reason,
    }
}
