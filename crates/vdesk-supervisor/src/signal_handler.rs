use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::info;

use crate::error::SupervisorError;

/// Flips the shared shutdown flag on SIGINT or SIGTERM.
pub struct SignalHandler {
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl SignalHandler {
    pub fn setup(shutdown: Arc<AtomicBool>) -> Result<Self, SupervisorError> {
        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| SupervisorError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(signal = sig, "received termination signal, shutting down");
                    shutdown.store(true, Ordering::SeqCst);
                }
            })
            .map_err(|e| {
                SupervisorError::SignalSetup(format!("failed to spawn signal thread: {e}"))
            })?;

        Ok(Self { handle })
    }
}
