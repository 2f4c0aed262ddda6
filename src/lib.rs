pub mod allocator;
pub mod authorization;
pub mod config;
pub mod core_state; // Injected state container
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod onboarding;
pub mod pipeline; // Report ingestion + retrieval
pub mod records;
pub mod session; // Identity → role state machine, routing
pub mod store;

#[cfg(test)]
mod portal_tests;

pub use core_state::PortalState;
pub use error::PortalError;

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Medportal starting v{}", config::APP_VERSION);
    }
}
