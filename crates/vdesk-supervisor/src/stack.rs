//! The desktop stack startup sequence.
//!
//! Strictly linear: virtual framebuffer, desktop session, VNC exporter,
//! WebSocket bridge. Each child is registered with the process table the
//! moment it is spawned so that a failure anywhere in the sequence still
//! leaves every started process reachable for teardown.

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::assets::{self, Fetched};
use crate::config::Config;
use crate::credentials;
use crate::error::SupervisorError;
use crate::process::{ManagedProcess, ProcessTable, StackComponent};
use crate::readiness;

pub struct Supervisor {
    config: Config,
    table: Arc<ProcessTable>,
}

impl Supervisor {
    pub fn new(config: Config, table: Arc<ProcessTable>) -> Self {
        Self { config, table }
    }

    /// Start the whole chain. The first failure aborts the sequence; the
    /// caller is expected to tear down the table afterwards.
    pub fn start_stack(&self) -> Result<(), SupervisorError> {
        self.start_display()?;
        self.start_session()?;
        self.start_vnc()?;
        self.start_bridge()?;
        info!("desktop stack ready");
        Ok(())
    }

    /// Spawn the virtual framebuffer and verify it survives its settle
    /// window. A dead display is fatal and unrecoverable at this layer; no
    /// retry.
    fn start_display(&self) -> Result<(), SupervisorError> {
        let config = &self.config;
        info!(
            display = %config.display,
            resolution = %config.resolution,
            "starting virtual framebuffer"
        );
        let screen = format!("{}x{}", config.resolution, config.color_depth);
        let mut command = Command::new(&config.xvfb_bin);
        command
            .arg(&config.display)
            .args(["-screen", "0"])
            .arg(&screen)
            .args(["-ac", "+extension", "GLX"]);
        self.spawn_and_register(command, StackComponent::Display)?;

        thread::sleep(config.display_settle);
        if !self.table.is_running(StackComponent::Display) {
            return Err(SupervisorError::DisplayUnavailable {
                display: config.display.clone(),
            });
        }
        if config.probe {
            let socket = readiness::x_socket_path(config.display_number());
            if !readiness::wait_for_path(&socket, config.probe_timeout) {
                warn!(socket = %socket.display(), "X socket never appeared");
                return Err(SupervisorError::DisplayUnavailable {
                    display: config.display.clone(),
                });
            }
        }
        Ok(())
    }

    /// Spawn the desktop session against the display. A session exposes no
    /// crisp readiness signal, so the check is limited to ruling out an
    /// immediate crash, and only when probing is enabled.
    fn start_session(&self) -> Result<(), SupervisorError> {
        info!("starting desktop session");
        let mut command = Command::new(&self.config.session_bin);
        command.env("DISPLAY", &self.config.display);
        self.spawn_and_register(command, StackComponent::Session)?;

        thread::sleep(self.config.session_settle);
        if !self.table.is_running(StackComponent::Session) {
            if self.config.probe {
                return Err(SupervisorError::ComponentExited {
                    component: StackComponent::Session.as_str(),
                });
            }
            warn!("desktop session exited during its settle window");
        }
        Ok(())
    }

    /// Write the credential file and spawn the VNC exporter bound to the
    /// display.
    fn start_vnc(&self) -> Result<(), SupervisorError> {
        let config = &self.config;
        credentials::write_password_file(&config.password_file, &config.vnc_password)?;

        info!(port = config.vnc_port, "starting VNC exporter");
        let mut command = Command::new(&config.vnc_bin);
        command
            .arg("-display")
            .arg(&config.display)
            .args(["-localhost", "-forever", "-shared", "-rfbport"])
            .arg(config.vnc_port.to_string())
            .arg("-rfbauth")
            .arg(&config.password_file)
            .arg("-o")
            .arg(&config.vnc_log);
        self.spawn_and_register(command, StackComponent::Vnc)?;
        self.await_port(StackComponent::Vnc, config.vnc_port, config.vnc_settle)
    }

    /// Install the noVNC client if absent, then spawn the WebSocket bridge
    /// in front of the VNC port.
    fn start_bridge(&self) -> Result<(), SupervisorError> {
        let config = &self.config;
        match assets::ensure_novnc_assets(&config.novnc_dir, &config.novnc_url)? {
            Fetched::Downloaded => {
                info!(dir = %config.novnc_dir.display(), "installed noVNC assets")
            }
            Fetched::AlreadyPresent => {}
        }

        info!(port = config.websocket_port, "starting WebSocket bridge");
        let mut command = Command::new(&config.websockify_bin);
        command
            .arg("--web")
            .arg(&config.novnc_dir)
            .arg(config.websocket_port.to_string())
            .arg(format!("localhost:{}", config.vnc_port));
        self.spawn_and_register(command, StackComponent::Bridge)?;
        self.await_port(
            StackComponent::Bridge,
            config.websocket_port,
            config.bridge_settle,
        )
    }

    fn spawn_and_register(
        &self,
        mut command: Command,
        component: StackComponent,
    ) -> Result<(), SupervisorError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Each child leads its own process group so shutdown can signal the
        // whole subtree.
        command.process_group(0);
        let child = command.spawn().map_err(|source| SupervisorError::Spawn {
            program: command.get_program().to_string_lossy().into_owned(),
            source,
        })?;
        debug!(component = component.as_str(), pid = child.id(), "spawned");
        self.table.register(ManagedProcess::new(component, child));
        Ok(())
    }

    /// With probing enabled, wait until the component's port accepts
    /// connections; otherwise fall back to the historical fixed delay.
    fn await_port(
        &self,
        component: StackComponent,
        port: u16,
        settle: std::time::Duration,
    ) -> Result<(), SupervisorError> {
        if self.config.probe {
            if !readiness::wait_for_port(port, self.config.probe_timeout) {
                return Err(SupervisorError::NotReady {
                    component: component.as_str(),
                    port,
                    timeout: self.config.probe_timeout,
                });
            }
        } else {
            thread::sleep(settle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::StackStatusSource;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// A stand-in daemon: ignores its arguments and sleeps.
    fn fake_daemon(dir: &Path) -> PathBuf {
        let path = dir.join("fake-daemon");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
        make_executable(&path);
        path
    }

    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn test_config(dir: &Path) -> Config {
        let daemon = fake_daemon(dir).to_string_lossy().into_owned();
        let novnc_dir = dir.join("novnc");
        std::fs::create_dir_all(&novnc_dir).unwrap();
        std::fs::write(novnc_dir.join("vnc.html"), b"<html></html>").unwrap();
        let mut config = Config::default().with_probe(false);
        config.password_file = dir.join("vnc_passwd");
        config.vnc_log = dir.join("x11vnc.log");
        config.novnc_dir = novnc_dir;
        config.novnc_url = "http://127.0.0.1:9/unreachable.tar.gz".to_string();
        config.display_settle = Duration::from_millis(50);
        config.session_settle = Duration::from_millis(50);
        config.vnc_settle = Duration::from_millis(50);
        config.bridge_settle = Duration::from_millis(50);
        config.xvfb_bin = daemon.clone();
        config.session_bin = daemon.clone();
        config.vnc_bin = daemon.clone();
        config.websockify_bin = daemon;
        config
    }

    #[test]
    fn test_start_stack_brings_up_all_four_components() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let table = Arc::new(ProcessTable::new());
        let supervisor = Supervisor::new(config.clone(), Arc::clone(&table));

        supervisor.start_stack().unwrap();
        let status = table.stack_status();
        assert!(status.ready(), "expected all components running: {status:?}");
        assert_eq!(
            std::fs::read_to_string(&config.password_file).unwrap(),
            "huggingface"
        );

        table.shutdown_all();
        assert!(!table.stack_status().ready());
    }

    #[test]
    fn test_missing_display_binary_fails_before_session_starts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.xvfb_bin = dir
            .path()
            .join("does-not-exist")
            .to_string_lossy()
            .into_owned();
        let table = Arc::new(ProcessTable::new());
        let supervisor = Supervisor::new(config, Arc::clone(&table));

        let err = supervisor.start_stack().unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(!table.is_running(StackComponent::Session));
        table.shutdown_all();
    }

    #[test]
    fn test_dead_display_fails_its_liveness_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.xvfb_bin = "/bin/false".to_string();
        let table = Arc::new(ProcessTable::new());
        let supervisor = Supervisor::new(config, Arc::clone(&table));

        let err = supervisor.start_stack().unwrap_err();
        assert!(matches!(err, SupervisorError::DisplayUnavailable { .. }));
        table.shutdown_all();
    }

    #[test]
    fn test_probe_mode_rejects_a_session_that_exits_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.session_bin = "/bin/true".to_string();
        let table = Arc::new(ProcessTable::new());
        let supervisor = Supervisor::new(config.clone(), Arc::clone(&table));

        // Historical mode shrugs the dead session off.
        supervisor.start_session().unwrap();

        config.probe = true;
        let strict = Supervisor::new(config, Arc::clone(&table));
        let err = strict.start_session().unwrap_err();
        assert!(matches!(err, SupervisorError::ComponentExited { .. }));
        table.shutdown_all();
    }

    #[test]
    fn test_port_probe_times_out_when_nothing_listens() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.probe = true;
        config.probe_timeout = Duration::from_millis(200);
        // A port that was free a moment ago, so nothing answers the probe.
        config.vnc_port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let table = Arc::new(ProcessTable::new());
        let supervisor = Supervisor::new(config, Arc::clone(&table));

        // Fake x11vnc never listens, so the probe must fail.
        let err = supervisor.start_vnc().unwrap_err();
        assert!(matches!(err, SupervisorError::NotReady { .. }));
        table.shutdown_all();
    }
}
