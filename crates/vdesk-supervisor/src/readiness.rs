//! Readiness probes for the spawned components.
//!
//! Fixed settle delays are a weak substitute for knowing a process is
//! usable; where a component exposes an observable signal (a listening TCP
//! port, an X socket on disk) these probes poll it with exponential backoff.

use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

const X_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// Poll until a TCP port on localhost accepts connections.
pub fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    poll(timeout, || {
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
    })
}

/// Poll until `path` exists on disk.
pub fn wait_for_path(path: &Path, timeout: Duration) -> bool {
    poll(timeout, || path.exists())
}

/// The socket the X server creates for display `number` once it accepts
/// clients.
pub fn x_socket_path(number: &str) -> PathBuf {
    PathBuf::from(X_SOCKET_DIR).join(format!("X{number}"))
}

fn poll(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    let mut delay = INITIAL_POLL_INTERVAL;
    loop {
        if check() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(delay);
        delay = (delay * 2).min(MAX_POLL_INTERVAL);
    }
}
