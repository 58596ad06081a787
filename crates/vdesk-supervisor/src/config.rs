//! Startup configuration, sourced from the environment once and immutable
//! afterwards.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::SupervisorError;

pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1280,
    height: 720,
};
pub const DEFAULT_VNC_PASSWORD: &str = "huggingface";
pub const DEFAULT_VNC_PORT: u16 = 5900;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 6080;
pub const DEFAULT_HTTP_PORT: u16 = 7860;
pub const DEFAULT_DISPLAY: &str = ":1";
pub const DEFAULT_COLOR_DEPTH: u8 = 24;

const DEFAULT_NOVNC_DIR: &str = "/home/user/novnc";
const DEFAULT_NOVNC_URL: &str =
    "https://github.com/novnc/noVNC/archive/refs/tags/v1.4.0.tar.gz";
const DEFAULT_PASSWORD_FILE: &str = "/tmp/vnc_passwd";
const DEFAULT_VNC_LOG: &str = "/tmp/x11vnc.log";

const DISPLAY_SETTLE: Duration = Duration::from_secs(2);
const SESSION_SETTLE: Duration = Duration::from_secs(3);
const VNC_SETTLE: Duration = Duration::from_secs(2);
const BRIDGE_SETTLE: Duration = Duration::from_secs(2);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Virtual display geometry, parsed from a `WIDTHxHEIGHT` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(2, 'x');
        let width = parts.next().and_then(|v| v.parse::<u32>().ok());
        let height = parts.next().and_then(|v| v.parse::<u32>().ok());
        match (width, height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                Ok(Self { width, height })
            }
            _ => Err(SupervisorError::InvalidResolution(s.to_string())),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        DEFAULT_RESOLUTION
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub resolution: Resolution,
    pub color_depth: u8,
    pub vnc_password: String,
    pub vnc_port: u16,
    pub websocket_port: u16,
    pub http_port: u16,
    /// X display identifier, e.g. `:1`.
    pub display: String,
    pub novnc_dir: PathBuf,
    pub novnc_url: String,
    pub password_file: PathBuf,
    pub vnc_log: PathBuf,
    pub display_settle: Duration,
    pub session_settle: Duration,
    pub vnc_settle: Duration,
    pub bridge_settle: Duration,
    /// When true (the default), readiness failures of any component abort
    /// startup. When false, only the display liveness check can fail and the
    /// fixed settle delays stand in for readiness confirmation.
    pub probe: bool,
    pub probe_timeout: Duration,
    pub xvfb_bin: String,
    pub session_bin: String,
    pub vnc_bin: String,
    pub websockify_bin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            color_depth: DEFAULT_COLOR_DEPTH,
            vnc_password: DEFAULT_VNC_PASSWORD.to_string(),
            vnc_port: DEFAULT_VNC_PORT,
            websocket_port: DEFAULT_WEBSOCKET_PORT,
            http_port: DEFAULT_HTTP_PORT,
            display: DEFAULT_DISPLAY.to_string(),
            novnc_dir: PathBuf::from(DEFAULT_NOVNC_DIR),
            novnc_url: DEFAULT_NOVNC_URL.to_string(),
            password_file: PathBuf::from(DEFAULT_PASSWORD_FILE),
            vnc_log: PathBuf::from(DEFAULT_VNC_LOG),
            display_settle: DISPLAY_SETTLE,
            session_settle: SESSION_SETTLE,
            vnc_settle: VNC_SETTLE,
            bridge_settle: BRIDGE_SETTLE,
            probe: true,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            xvfb_bin: "Xvfb".to_string(),
            session_bin: "startxfce4".to_string(),
            vnc_bin: "x11vnc".to_string(),
            websockify_bin: "websockify".to_string(),
        }
    }
}

impl Config {
    /// Read configuration from the environment. An unparseable resolution is
    /// an error; other malformed values fall back to their defaults with a
    /// warning.
    pub fn from_env() -> Result<Self, SupervisorError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("RESOLUTION") {
            config.resolution = value.parse()?;
        }
        if let Ok(value) = env::var("VNC_PASSWORD") {
            config.vnc_password = value;
        }
        config.vnc_port = env_port("VNC_PORT", config.vnc_port);
        config.websocket_port = env_port("NOVNC_PORT", config.websocket_port);
        config.http_port = env_port("PORT", config.http_port);
        if let Ok(value) = env::var("DISPLAY_NUM") {
            config.display = value;
        }
        if let Ok(value) = env::var("NOVNC_DIR") {
            config.novnc_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("NOVNC_URL") {
            config.novnc_url = value;
        }
        if let Ok(value) = env::var("VDESK_PASSWORD_FILE") {
            config.password_file = PathBuf::from(value);
        }
        if let Ok(value) = env::var("VDESK_VNC_LOG") {
            config.vnc_log = PathBuf::from(value);
        }
        if let Some(settle) = env_millis("VDESK_SETTLE_MS") {
            config.display_settle = settle;
            config.session_settle = settle;
            config.vnc_settle = settle;
            config.bridge_settle = settle;
        }
        if let Some(probe) = env_bool("VDESK_PROBE") {
            config.probe = probe;
        }
        if let Some(timeout) = env_millis("VDESK_PROBE_TIMEOUT_MS") {
            config.probe_timeout = timeout;
        }
        if let Ok(value) = env::var("VDESK_XVFB_BIN") {
            config.xvfb_bin = value;
        }
        if let Ok(value) = env::var("VDESK_SESSION_BIN") {
            config.session_bin = value;
        }
        if let Ok(value) = env::var("VDESK_X11VNC_BIN") {
            config.vnc_bin = value;
        }
        if let Ok(value) = env::var("VDESK_WEBSOCKIFY_BIN") {
            config.websockify_bin = value;
        }

        Ok(config)
    }

    /// The numeric part of the display identifier (`:1` -> `1`), used to
    /// locate the X socket.
    pub fn display_number(&self) -> &str {
        self.display.trim_start_matches(':')
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe = probe;
        self
    }
}

fn env_port(key: &'static str, default: u16) -> u16 {
    match env::var(key) {
        Ok(value) => match value.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                warn!(key, value = %value, "invalid port value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_millis(key: &'static str) -> Option<Duration> {
    match env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                warn!(key, value = %value, "invalid millisecond value; using default");
                None
            }
        },
        Err(_) => None,
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|value| match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}
