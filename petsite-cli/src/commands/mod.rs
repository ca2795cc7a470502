//! CLI command implementations

pub mod account;
pub mod doctor;
pub mod logs;
pub mod outbox;
pub mod pets;

use std::path::PathBuf;

use anyhow::{Context, Result};
use petsite_core::config;
use petsite_core::services::{guard, Access, EntryPoint, LogEvent, LoggingService, Route, SessionListener};
use petsite_core::{PetsiteContext, SessionView};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let petsite_dir = get_petsite_dir();
    std::fs::create_dir_all(&petsite_dir).ok()?;
    LoggingService::new(&petsite_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the petsite directory from environment or default
pub fn get_petsite_dir() -> PathBuf {
    config::default_dir()
}

/// Open the petsite context in the data directory
pub fn get_context() -> Result<PetsiteContext> {
    let petsite_dir = get_petsite_dir();
    PetsiteContext::new(&petsite_dir).context("Failed to initialize petsite context")
}

/// An opened page: the listener keeping the view current plus the resolved view
pub struct Page {
    pub route: Route,
    pub view: SessionView,
    listener: SessionListener,
}

impl Page {
    pub async fn close(self) {
        self.listener.shutdown().await;
    }
}

/// Start the session listener, wait for the view to resolve and run the
/// route through the session gate
pub async fn open_page(ctx: &PetsiteContext, route: Route) -> Result<Page> {
    let listener = ctx.start_session_listener()?;
    let view = ctx.session().ready().await?;

    log_event(&get_logger(), LogEvent::new("page_opened").with_route(route.path()));

    match guard(&route, &view) {
        Access::Allow => Ok(Page {
            route,
            view,
            listener,
        }),
        Access::Redirect(target) => {
            listener.shutdown().await;
            anyhow::bail!(
                "You need to sign in to view {} (redirected to {}). Run `petsite signin`.",
                route,
                target
            )
        }
        // ready() only returns once loading is over
        Access::Pending => {
            listener.shutdown().await;
            anyhow::bail!("Session is still loading")
        }
    }
}
