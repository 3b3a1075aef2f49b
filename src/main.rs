//! Challenge Hub · marketplace client
//!
//! - Typed client for the marketplace REST backend (session, problems, quiz, ideas, users)
//! - Quiz gate state machine deciding when a student may submit an idea
//! - Interactive console shell driving the whole workflow
//!
//! Important env variables:
//!   HUB_ENV                     : "development" (default) or "production"
//!   HUB_API_BASE_URL            : overrides the per-environment backend URL
//!   HUB_SESSION_DIR             : where the token and user are persisted (default ".challenge-hub")
//!   HUB_REQUEST_TIMEOUT_SECS    : per-request timeout (default 15)
//!   HUB_NOTIFICATION_POLL_SECS  : unread-notification poll interval (default 30)
//!   HUB_CONFIG_PATH             : optional TOML file with the same keys
//!   LOG_LEVEL                   : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                  : "pretty" (default) or "json"

mod api;
mod config;
mod console;
mod domain;
mod error;
mod feed;
mod flow;
mod gateway;
mod idea;
mod manage;
mod protocol;
mod quiz;
mod session;
mod shell;
mod telemetry;
mod util;

use tracing::info;

use crate::config::AppConfig;
use crate::shell::AppShell;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::load();
  let mut shell = AppShell::new(config)?;
  info!(
    target: "hub_client",
    base_url = %shell.gateway().base_url(),
    environment = ?shell.config().environment,
    "Client ready"
  );

  match shell.start().await {
    Some(session) => {
      info!(target: "hub_client", user_id = %session.user.id, role = %session.user.role, "Resumed session");
      let _ = shell.refresh_feed(false).await;
    }
    None => info!(target: "hub_client", "No saved session; please log in"),
  }

  tokio::select! {
    r = console::run(&mut shell) => r?,
    _ = tokio::signal::ctrl_c() => info!(target: "hub_client", "Interrupted"),
  }
  Ok(())
}
