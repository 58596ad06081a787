use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while bringing up or tearing down the desktop stack.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid resolution '{0}', expected WIDTHxHEIGHT")]
    InvalidResolution(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("display {display} is not available after its settle window")]
    DisplayUnavailable { display: String },

    #[error("{component} exited during startup")]
    ComponentExited { component: &'static str },

    #[error("{component} did not accept connections on port {port} within {timeout:?}")]
    NotReady {
        component: &'static str,
        port: u16,
        timeout: Duration,
    },

    #[error("failed to write credential file {path}: {source}")]
    Credential {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch noVNC assets from {url}: {reason}")]
    AssetFetch { url: String, reason: String },

    #[error("failed to set up signal handling: {0}")]
    SignalSetup(String),
}
