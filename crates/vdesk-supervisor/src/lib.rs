//! Process supervision for the vdesk remote desktop stack.
//!
//! Launches and tracks the four external programs that make up the desktop
//! chain (virtual framebuffer, desktop session, VNC exporter, WebSocket
//! bridge), probes their readiness, and tears the whole set down on shutdown.

pub mod assets;
pub mod config;
pub mod credentials;
pub mod error;
pub mod process;
pub mod readiness;
pub mod signal_handler;
pub mod stack;

pub use config::{Config, Resolution};
pub use error::SupervisorError;
pub use process::{ProcessTable, StackComponent, StackStatus, StackStatusSource};
pub use signal_handler::SignalHandler;
pub use stack::Supervisor;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serializes tests that read or mutate process environment variables.
    pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    pub(crate) struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        pub(crate) fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prev }
        }

        pub(crate) fn remove(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.prev.take() {
                Some(prev) => std::env::set_var(self.key, prev),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
