//! First-run download of the noVNC web client.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::info;

use crate::error::SupervisorError;

/// File whose presence marks an installed client; release tarballs ship it
/// at the archive root.
const MARKER_FILE: &str = "vnc.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    AlreadyPresent,
    Downloaded,
}

/// Ensure the noVNC client is present at `dir`, downloading the release
/// tarball on first run. Idempotent: existing assets mean no network I/O.
pub fn ensure_novnc_assets(dir: &Path, url: &str) -> Result<Fetched, SupervisorError> {
    if dir.join(MARKER_FILE).exists() {
        return Ok(Fetched::AlreadyPresent);
    }

    info!(url, dir = %dir.display(), "fetching noVNC assets");
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_error(url, e.to_string()))?;
    let body = response
        .bytes()
        .map_err(|e| fetch_error(url, e.to_string()))?;
    unpack_tarball(&body, dir).map_err(|e| fetch_error(url, e.to_string()))?;

    if !dir.join(MARKER_FILE).exists() {
        return Err(fetch_error(
            url,
            format!("archive did not contain {MARKER_FILE}"),
        ));
    }
    Ok(Fetched::Downloaded)
}

fn fetch_error(url: &str, reason: String) -> SupervisorError {
    SupervisorError::AssetFetch {
        url: url.to_string(),
        reason,
    }
}

/// Unpack a gzipped tarball into `dir`, stripping the top-level directory
/// component (release tarballs nest everything under `noVNC-<version>/`).
fn unpack_tarball(bytes: &[u8], dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        entry.unpack(dir.join(stripped))?;
    }
    Ok(())
}
