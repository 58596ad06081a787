//! Front controller server.
//!
//! Runs on its own thread with a small tokio runtime so the supervisor's
//! control thread stays synchronous. The root route doubles as the container
//! health-check target and deliberately reports success regardless of the
//! desktop chain's health; `/api/status` is the honest view.

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use vdesk_supervisor::{Config, Resolution, StackStatusSource};

use crate::error::WebServerError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

const INDEX_HTML: &str = include_str!("../assets/index.html");
const DESKTOP_HTML: &str = include_str!("../assets/desktop.html");
const TERMINAL_HTML: &str = include_str!("../assets/terminal.html");

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub listen: String,
    pub novnc_dir: PathBuf,
    pub resolution: Resolution,
    pub vnc_port: u16,
    pub websocket_port: u16,
}

impl WebConfig {
    pub fn from_supervisor(config: &Config) -> Self {
        Self {
            listen: format!("0.0.0.0:{}", config.http_port),
            novnc_dir: config.novnc_dir.clone(),
            resolution: config.resolution,
            vnc_port: config.vnc_port,
            websocket_port: config.websocket_port,
        }
    }
}

struct WebState {
    status: Arc<dyn StackStatusSource>,
    resolution: Resolution,
    vnc_port: u16,
    websocket_port: u16,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatusResponse {
    display: bool,
    session: bool,
    vnc: bool,
    websockify: bool,
    ready: bool,
    resolution: String,
    vnc_port: u16,
    websocket_port: u16,
    started_at: String,
}

pub struct WebServerHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    join: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl WebServerHandle {
    /// The address the server actually bound, useful when the configured
    /// port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(join) = self.join.take() {
            let (done_tx, done_rx) = std_mpsc::channel();
            let _ = thread::Builder::new()
                .name("web-shutdown".to_string())
                .spawn(move || {
                    let _ = join.join();
                    let _ = done_tx.send(());
                });
            if done_rx.recv_timeout(SHUTDOWN_TIMEOUT).is_err() {
                warn!("front controller did not stop within shutdown timeout");
            }
        }
    }
}

pub fn start_web_server(
    status: Arc<dyn StackStatusSource>,
    shutdown_flag: Arc<AtomicBool>,
    config: WebConfig,
) -> Result<WebServerHandle, WebServerError> {
    let (listener, local_addr) = bind_listener(&config.listen)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = Arc::new(WebState {
        status,
        resolution: config.resolution,
        vnc_port: config.vnc_port,
        websocket_port: config.websocket_port,
        started_at: Utc::now(),
    });
    let novnc_dir = config.novnc_dir;
    let shutdown_tx_for_thread = shutdown_tx.clone();

    let join = thread::Builder::new()
        .name("vdesk-web".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(rt) => rt,
                Err(err) => {
                    error!(error = %err, "failed to build web runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let app = build_router(state, &novnc_dir);
                let listener = match TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(err) => {
                        error!(error = %err, "failed to create async listener");
                        return;
                    }
                };
                info!(addr = %local_addr, "front controller listening");

                let mut shutdown_rx_server = shutdown_rx.clone();
                let mut shutdown_rx_wait = shutdown_rx;
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx_server.changed().await;
                });
                let mut server_task = tokio::spawn(async move { server.await });

                let flag_task = tokio::spawn(async move {
                    while !shutdown_flag.load(Ordering::Relaxed) {
                        tokio::time::sleep(SHUTDOWN_POLL).await;
                    }
                    let _ = shutdown_tx_for_thread.send(true);
                });

                tokio::select! {
                    join_result = &mut server_task => {
                        log_server_result(join_result);
                    }
                    changed = shutdown_rx_wait.changed() => {
                        if changed.is_err() {
                            warn!("web shutdown channel closed");
                        }
                        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server_task).await {
                            Ok(join_result) => log_server_result(join_result),
                            Err(_) => {
                                warn!(
                                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                                    "front controller shutdown timed out; aborting"
                                );
                                server_task.abort();
                            }
                        }
                    }
                }
                flag_task.abort();
            });
        })
        .map_err(|e| WebServerError::Io {
            operation: "spawn web thread",
            source: e,
        })?;

    Ok(WebServerHandle {
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
        local_addr,
    })
}

fn log_server_result(result: Result<Result<(), std::io::Error>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "front controller server error"),
        Err(err) => error!(error = %err, "front controller task failed"),
    }
}

fn build_router(state: Arc<WebState>, novnc_dir: &Path) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/", get(index_handler))
        .route("/desktop", get(desktop_handler))
        .route("/terminal", get(terminal_handler))
        .route("/api/status", get(status_handler))
        .nest_service("/novnc", ServeDir::new(novnc_dir))
        .layer(cors)
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn desktop_handler() -> Html<&'static str> {
    Html(DESKTOP_HTML)
}

async fn terminal_handler() -> Html<&'static str> {
    Html(TERMINAL_HTML)
}

async fn status_handler(State(state): State<Arc<WebState>>) -> Json<StatusResponse> {
    let status = state.status.stack_status();
    Json(StatusResponse {
        display: status.display,
        session: status.session,
        vnc: status.vnc,
        websockify: status.websockify,
        ready: status.ready(),
        resolution: state.resolution.to_string(),
        vnc_port: state.vnc_port,
        websocket_port: state.websocket_port,
        started_at: state.started_at.to_rfc3339(),
    })
}

fn bind_listener(listen: &str) -> Result<(std::net::TcpListener, SocketAddr), WebServerError> {
    let mut addrs = listen
        .to_socket_addrs()
        .map_err(|e| WebServerError::InvalidListen {
            message: e.to_string(),
        })?;
    let addr = addrs.next().ok_or_else(|| WebServerError::InvalidListen {
        message: "no resolved address".to_string(),
    })?;

    let listener = std::net::TcpListener::bind(addr).map_err(|e| WebServerError::Io {
        operation: "bind",
        source: e,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| WebServerError::Io {
            operation: "set non-blocking",
            source: e,
        })?;
    let local_addr = listener.local_addr().map_err(|e| WebServerError::Io {
        operation: "read local address",
        source: e,
    })?;
    Ok((listener, local_addr))
}
