//! Process handles for the spawned desktop components and the table that
//! owns them until shutdown.

use std::process::Child;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

const TERM_WAIT: Duration = Duration::from_secs(5);
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    NotFound,
    NoPermission,
}

pub trait ProcessController: Send + Sync {
    fn check_process(&self, pid: u32) -> Result<ProcessStatus, std::io::Error>;

    /// Signal the whole process group rooted at `pgid`.
    fn send_group_signal(&self, pgid: u32, signal: Signal) -> Result<(), std::io::Error>;
}

pub struct UnixProcessController;

impl UnixProcessController {
    fn raw_signal(signal: Signal) -> libc::c_int {
        match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }

    fn kill(pid: libc::pid_t, sig: libc::c_int) -> Result<(), std::io::Error> {
        let result = unsafe { libc::kill(pid, sig) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    fn to_pid_t(pid: u32) -> Result<libc::pid_t, std::io::Error> {
        pid.try_into().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "PID out of range")
        })
    }
}

impl ProcessController for UnixProcessController {
    fn check_process(&self, pid: u32) -> Result<ProcessStatus, std::io::Error> {
        let pid_t = Self::to_pid_t(pid)?;
        match Self::kill(pid_t, 0) {
            Ok(()) => Ok(ProcessStatus::Running),
            Err(err) => match err.raw_os_error() {
                Some(libc::ESRCH) => Ok(ProcessStatus::NotFound),
                Some(libc::EPERM) => Ok(ProcessStatus::NoPermission),
                _ => Err(err),
            },
        }
    }

    fn send_group_signal(&self, pgid: u32, signal: Signal) -> Result<(), std::io::Error> {
        let pid_t = Self::to_pid_t(pgid)?;
        Self::kill(-pid_t, Self::raw_signal(signal))
    }
}

/// The four external programs the supervisor owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackComponent {
    Display,
    Session,
    Vnc,
    Bridge,
}

impl StackComponent {
    pub const ALL: [StackComponent; 4] = [
        StackComponent::Display,
        StackComponent::Session,
        StackComponent::Vnc,
        StackComponent::Bridge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StackComponent::Display => "xvfb",
            StackComponent::Session => "desktop-session",
            StackComponent::Vnc => "x11vnc",
            StackComponent::Bridge => "websockify",
        }
    }
}

/// Liveness of each stack component, as reported by the process table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StackStatus {
    pub display: bool,
    pub session: bool,
    pub vnc: bool,
    pub websockify: bool,
}

impl StackStatus {
    pub fn ready(&self) -> bool {
        self.display && self.session && self.vnc && self.websockify
    }
}

/// Read-side port for the front controller's status endpoint.
pub trait StackStatusSource: Send + Sync {
    fn stack_status(&self) -> StackStatus;
}

pub struct ManagedProcess {
    component: StackComponent,
    child: Child,
}

impl ManagedProcess {
    pub fn new(component: StackComponent, child: Child) -> Self {
        Self { component, child }
    }

    pub fn component(&self) -> StackComponent {
        self.component
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Owns every spawned component from registration until shutdown.
///
/// Children are expected to lead their own process groups so that
/// `shutdown_all` can signal entire subtrees.
pub struct ProcessTable {
    procs: Mutex<Vec<ManagedProcess>>,
    controller: Arc<dyn ProcessController>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::with_controller(Arc::new(UnixProcessController))
    }

    pub fn with_controller(controller: Arc<dyn ProcessController>) -> Self {
        Self {
            procs: Mutex::new(Vec::new()),
            controller,
        }
    }

    pub fn register(&self, process: ManagedProcess) {
        debug!(
            component = process.component.as_str(),
            pid = process.pid(),
            "tracking process"
        );
        self.lock().push(process);
    }

    pub fn is_running(&self, component: StackComponent) -> bool {
        self.lock()
            .iter_mut()
            .find(|p| p.component == component)
            .map(|p| p.is_running())
            .unwrap_or(false)
    }

    /// Terminate every tracked process: SIGTERM to each group, a bounded
    /// backoff wait, then SIGKILL for stragglers. Already-exited handles are
    /// silently tolerated.
    pub fn shutdown_all(&self) {
        let drained: Vec<ManagedProcess> = self.lock().drain(..).collect();
        for mut process in drained {
            let component = process.component.as_str();
            let pid = process.pid();
            if !process.is_running() {
                debug!(component, pid, "process already exited");
                continue;
            }
            if let Err(err) = self.controller.send_group_signal(pid, Signal::Term) {
                debug!(component, pid, error = %err, "termination signal failed");
            }

            let start = Instant::now();
            let mut delay = INITIAL_POLL_INTERVAL;
            while process.is_running() && start.elapsed() < TERM_WAIT {
                std::thread::sleep(delay);
                delay = (delay * 2).min(MAX_POLL_INTERVAL);
            }

            if process.is_running() {
                warn!(component, pid, "process ignored SIGTERM; killing");
                let _ = self.controller.send_group_signal(pid, Signal::Kill);
                let _ = process.child.wait();
            } else {
                debug!(component, pid, "process terminated");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ManagedProcess>> {
        match self.procs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StackStatusSource for ProcessTable {
    fn stack_status(&self) -> StackStatus {
        let mut status = StackStatus::default();
        for process in self.lock().iter_mut() {
            let running = process.is_running();
            match process.component {
                StackComponent::Display => status.display = running,
                StackComponent::Session => status.session = running,
                StackComponent::Vnc => status.vnc = running,
                StackComponent::Bridge => status.websockify = running,
            }
        }
        status
    }
}
