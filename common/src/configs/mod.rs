mod discovery_config;
mod log_config;

pub use discovery_config::*;
pub use log_config::*;
