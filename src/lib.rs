pub mod commands;
pub mod config;
pub mod core_state; // Sync coordinator shared by every entry point
pub mod db;
pub mod health;
pub mod models;
pub mod signal;
pub mod sync; // Background sync pipeline
pub mod transfer;

use tracing_subscriber::EnvFilter;

pub use core_state::{CoreError, HealthSync};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// default filter. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
