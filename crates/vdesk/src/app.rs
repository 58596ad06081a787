//! Application wiring and the main control loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use vdesk_supervisor::{
    credentials, Config, ProcessTable, SignalHandler, StackStatusSource, Supervisor,
};
use vdesk_web::{start_web_server, WebConfig};

use crate::cli::Cli;

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Run the whole system; returns the process exit code.
///
/// Exit codes: 0 on clean shutdown (including a termination signal), 1 on
/// any fatal startup failure.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = Config::from_env().context("invalid configuration")?;
    apply_overrides(&mut config, &cli)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let _signals =
        SignalHandler::setup(Arc::clone(&shutdown)).context("signal handler setup")?;

    let table = Arc::new(ProcessTable::new());
    let supervisor = Supervisor::new(config.clone(), Arc::clone(&table));
    if let Err(err) = supervisor.start_stack() {
        error!(error = %err, "desktop stack failed to start");
        teardown(&table, &config);
        return Ok(1);
    }

    let status: Arc<dyn StackStatusSource> = Arc::clone(&table) as Arc<dyn StackStatusSource>;
    let web = match start_web_server(
        status,
        Arc::clone(&shutdown),
        WebConfig::from_supervisor(&config),
    ) {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "front controller failed to start");
            teardown(&table, &config);
            return Ok(1);
        }
    };
    info!(port = config.http_port, "vdesk serving");

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(SHUTDOWN_POLL);
    }

    info!("shutting down");
    web.shutdown();
    teardown(&table, &config);
    Ok(0)
}

fn teardown(table: &ProcessTable, config: &Config) {
    table.shutdown_all();
    credentials::remove_password_file(&config.password_file);
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(resolution) = &cli.resolution {
        config.resolution = resolution
            .parse()
            .context("invalid --resolution value")?;
    }
    if let Some(port) = cli.port {
        config.http_port = port;
    }
    if let Some(port) = cli.vnc_port {
        config.vnc_port = port;
    }
    if let Some(port) = cli.websocket_port {
        config.websocket_port = port;
    }
    if let Some(dir) = &cli.novnc_dir {
        config.novnc_dir = dir.clone();
    }
    if cli.no_probe {
        config.probe = false;
    }
    Ok(())
}
