use std::path::PathBuf;

use clap::Parser;

/// Boots a browser-reachable Linux desktop: virtual framebuffer, desktop
/// session, VNC exporter and WebSocket bridge, fronted by a small web server.
#[derive(Debug, Parser)]
#[command(name = "vdesk")]
#[command(author, version)]
#[command(about = "Virtual desktop supervisor and web front controller")]
pub struct Cli {
    /// Virtual display resolution, e.g. 1280x720
    #[arg(long, env = "RESOLUTION")]
    pub resolution: Option<String>,

    /// HTTP port for the front controller
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// VNC server port
    #[arg(long, env = "VNC_PORT")]
    pub vnc_port: Option<u16>,

    /// WebSocket bridge port
    #[arg(long, env = "NOVNC_PORT")]
    pub websocket_port: Option<u16>,

    /// Directory holding the noVNC web client
    #[arg(long, env = "NOVNC_DIR")]
    pub novnc_dir: Option<PathBuf>,

    /// Disable readiness probing and fall back to fixed settle delays
    #[arg(long)]
    pub no_probe: bool,
}
