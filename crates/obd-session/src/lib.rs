//! OBD-II Diagnostic Sessions
//!
//! Opens an ELM327 adapter, walks the emission-related parameters in a fixed
//! order and collects them into a [`Report`].

mod config;
mod report;
mod session;

pub use config::{SessionConfig, CONFIG_FILE, ENV_PREFIX};
pub use report::Report;
pub use session::DiagnosticSession;

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
///
/// Unknown levels fall back to `info`.
pub fn init_logging(level: &str, json: bool) -> Result<(), SetGlobalDefaultError> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}
