//! HTTP front controller: landing page, desktop and terminal views, the
//! status API, and the noVNC static assets.

mod error;
mod server;

pub use error::WebServerError;
pub use server::{start_web_server, WebConfig, WebServerHandle};
