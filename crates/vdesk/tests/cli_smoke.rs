//! Smoke tests against the compiled binary. Startup failures must exit
//! before any later component is attempted; success paths are covered by the
//! lifecycle tests.

mod common;

use assert_cmd::Command;
use common::{novnc_fixture, write_fake_daemon};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

struct StackTestEnv {
    temp: TempDir,
    pid_dir: PathBuf,
}

impl StackTestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let pid_dir = temp.path().join("pids");
        std::fs::create_dir_all(&pid_dir).expect("create pid dir");
        Self { temp, pid_dir }
    }

    fn daemon(&self, name: &str) -> PathBuf {
        write_fake_daemon(self.temp.path(), name, &self.pid_dir)
    }

    fn command(&self) -> Command {
        let novnc = novnc_fixture(self.temp.path());
        let mut cmd = Command::cargo_bin("vdesk").expect("vdesk binary");
        cmd.env_remove("RESOLUTION")
            .env_remove("VNC_PASSWORD")
            .env("VDESK_XVFB_BIN", self.daemon("xvfb"))
            .env("VDESK_SESSION_BIN", self.daemon("session"))
            .env("VDESK_X11VNC_BIN", self.daemon("vnc"))
            .env("VDESK_WEBSOCKIFY_BIN", self.daemon("bridge"))
            .env("VDESK_SETTLE_MS", "50")
            .env("VDESK_PROBE", "0")
            .env("NOVNC_DIR", novnc)
            .env("VDESK_PASSWORD_FILE", self.temp.path().join("vnc_passwd"))
            .env("VDESK_VNC_LOG", self.temp.path().join("x11vnc.log"))
            .env("PORT", common::free_port().to_string());
        cmd
    }

    fn pid_file(&self, name: &str) -> PathBuf {
        self.pid_dir.join(format!("{name}.pid"))
    }
}

#[test]
fn smoke_help_shows_usage() {
    Command::cargo_bin("vdesk")
        .expect("vdesk binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Virtual desktop supervisor and web front controller",
        ));
}

#[test]
fn smoke_missing_display_binary_exits_one_before_session() {
    let env = StackTestEnv::new();
    let mut cmd = env.command();
    cmd.env("VDESK_XVFB_BIN", env.temp.path().join("does-not-exist"));
    cmd.assert().code(1);
    assert!(
        !env.pid_file("session").exists(),
        "session must not start after a display spawn failure"
    );
}

#[test]
fn smoke_dead_display_binary_exits_one() {
    let env = StackTestEnv::new();
    let mut cmd = env.command();
    cmd.env("VDESK_XVFB_BIN", "/bin/false");
    cmd.assert().code(1);
    assert!(!env.pid_file("session").exists());
}

#[test]
fn smoke_invalid_resolution_is_rejected() {
    let env = StackTestEnv::new();
    let mut cmd = env.command();
    cmd.arg("--resolution").arg("garbage");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("resolution"));
    assert!(
        !env.pid_file("xvfb").exists(),
        "nothing must be spawned with an invalid configuration"
    );
}
