pub mod config;
pub mod configs;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod service;
pub mod service_register_center;

pub use error::{Error, Operation, RegistryError};
pub type Result<T> = std::result::Result<T, Error>;
