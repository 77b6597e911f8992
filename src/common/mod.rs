pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use logging::init as setup_logging;
