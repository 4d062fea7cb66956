pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use config::BookingConfig;
pub use error::{BookingError, Result};
pub use service::{BookingOperations, BookingService};
