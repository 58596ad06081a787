//! Shared fixtures for the binary tests: stand-in stack daemons and a
//! prepopulated noVNC directory, so no real X server or network is needed.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// Write an executable script that records its PID and sleeps, standing in
/// for one of the stack binaries. The `exec` keeps the recorded PID equal to
/// the long-lived process.
pub fn write_fake_daemon(dir: &Path, name: &str, pid_dir: &Path) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\necho $$ > '{}/{}.pid'\nexec sleep 30\n",
        pid_dir.display(),
        name
    );
    std::fs::write(&path, script).unwrap();
    make_executable(&path);
    path
}

pub fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A directory that already looks like an installed noVNC client, so the
/// asset-fetch step is a no-op.
pub fn novnc_fixture(dir: &Path) -> PathBuf {
    let novnc = dir.join("novnc");
    std::fs::create_dir_all(&novnc).unwrap();
    std::fs::write(novnc.join("vnc.html"), b"<html></html>").unwrap();
    novnc
}

/// A port that was free a moment ago. Racy by nature, good enough for tests.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
