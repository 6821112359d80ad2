//! HTTP access for metadata and binaries
//!
//! Requests use a blocking client moved onto tokio's blocking pool. There
//! are no timeouts beyond the transport defaults: a hung download blocks
//! the invocation.

use crate::error::{BazeliskError, BazeliskResult};
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use ureq::http::Response;
use uuid::Uuid;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Fetch a small remote file into memory.
///
/// `token` is sent as a GitHub-style `Authorization` header.
pub async fn read_remote_file(url: &str, token: Option<&str>) -> BazeliskResult<Vec<u8>> {
    let url = url.to_string();
    let token = token.map(str::to_string);

    run_blocking(move || {
        let response = get(&url, token.as_deref())?;
        let mut body = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| BazeliskError::Transport {
                url: url.clone(),
                reason: format!("failed to read body: {}", e),
            })?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    })
    .await
}

/// Download `url` to `dest_dir/dest_file` and mark it executable.
///
/// The body is written to a uniquely named temporary file in `dest_dir` and
/// renamed into place, so the final path only ever holds a complete binary.
/// If the destination already exists no request is made. When
/// `expected_sha256` is given the content must match it before the rename.
pub async fn download_binary(
    url: &str,
    dest_dir: &Path,
    dest_file: &str,
    expected_sha256: Option<&str>,
) -> BazeliskResult<PathBuf> {
    let destination = dest_dir.join(dest_file);
    if destination.exists() {
        debug!("{} already present, skipping download", destination.display());
        return Ok(destination);
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| BazeliskError::io(format!("creating directory {}", dest_dir.display()), e))?;

    let url = url.to_string();
    let temp_path = dest_dir.join(format!(".download-{}", Uuid::new_v4()));
    let expected = expected_sha256.map(str::to_lowercase);

    let fetch_path = temp_path.clone();
    let final_path = destination.clone();
    let result = run_blocking(move || {
        info!("Downloading {}...", url);
        let digest = fetch_to_file(&url, &fetch_path)?;

        if let Some(expected) = expected {
            if digest != expected {
                return Err(BazeliskError::ChecksumMismatch {
                    path: final_path,
                    expected,
                    actual: digest,
                });
            }
        }

        make_executable(&fetch_path)
    })
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    install(&temp_path, &destination).await?;
    Ok(destination)
}

/// Move a finished temporary file to its final name.
///
/// A concurrent download of the same artifact may have finished first; the
/// content is identical, so an existing destination counts as success.
pub async fn install(temp_path: &Path, destination: &Path) -> BazeliskResult<()> {
    match tokio::fs::rename(temp_path, destination).await {
        Ok(()) => Ok(()),
        Err(_) if destination.exists() => {
            debug!("{} was installed concurrently", destination.display());
            let _ = tokio::fs::remove_file(temp_path).await;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(temp_path).await;
            Err(BazeliskError::io(
                format!(
                    "moving {} to {}",
                    temp_path.display(),
                    destination.display()
                ),
                e,
            ))
        }
    }
}

fn get(url: &str, token: Option<&str>) -> BazeliskResult<Response<ureq::Body>> {
    let mut request = ureq::get(url);
    if let Some(token) = token {
        request = request.header("Authorization", format!("token {}", token));
    }

    request.call().map_err(|e| match e {
        ureq::Error::StatusCode(status) => BazeliskError::HttpStatus {
            url: url.to_string(),
            status,
        },
        other => BazeliskError::Transport {
            url: url.to_string(),
            reason: other.to_string(),
        },
    })
}

/// Stream a response body into `path`, returning the hex SHA-256 of the body
fn fetch_to_file(url: &str, path: &Path) -> BazeliskResult<String> {
    let response = get(url, None)?;
    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let progress = create_progress_bar(content_length);
    let mut reader = response.into_body().into_reader();
    let mut file = File::create(path)
        .map_err(|e| BazeliskError::io(format!("creating temporary file {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer).map_err(|e| BazeliskError::Transport {
            url: url.to_string(),
            reason: format!("failed to read body: {}", e),
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        file.write_all(&buffer[..read])
            .map_err(|e| BazeliskError::io(format!("writing {}", path.display()), e))?;
        progress.inc(read as u64);
    }

    file.sync_all()
        .map_err(|e| BazeliskError::io(format!("flushing {}", path.display()), e))?;
    progress.finish_and_clear();

    Ok(hex::encode(hasher.finalize()))
}

fn make_executable(path: &Path) -> BazeliskResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        std::fs::set_permissions(path, perms)
            .map_err(|e| BazeliskError::io(format!("could not chmod file {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn create_progress_bar(length: Option<u64>) -> ProgressBar {
    match length {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan}] {bytes}/{total_bytes}")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {bytes}") {
                pb.set_style(style);
            }
            pb
        }
    }
}

async fn run_blocking<T, F>(f: F) -> BazeliskResult<T>
where
    F: FnOnce() -> BazeliskResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BazeliskError::Internal(format!("blocking task failed: {}", e)))?
}
