//! The VNC credential file: a single secret at a well-known transient
//! location, consumed by the exporter at startup.

use std::path::Path;

use tracing::warn;

use crate::error::SupervisorError;

/// Materialize the password file with owner-only permissions.
///
/// Written to a sibling temp file and renamed into place so the secret is
/// never readable with loose permissions, even briefly.
pub fn write_password_file(path: &Path, secret: &str) -> Result<(), SupervisorError> {
    write_restricted(path, secret.as_bytes()).map_err(|source| SupervisorError::Credential {
        path: path.to_path_buf(),
        source,
    })
}

/// Best-effort removal at shutdown; a missing file is not an error.
pub fn remove_password_file(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove credential file");
        }
    }
}

fn write_restricted(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
