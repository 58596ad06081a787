//! vdesk wires the desktop-stack supervisor to the HTTP front controller.

mod app;
mod cli;
pub mod telemetry;

pub use app::run;
pub use cli::Cli;
