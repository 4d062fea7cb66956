use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Invalid date range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Conflict on {subject}: {detail}")]
    Conflict { subject: String, detail: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid rating score: {score}")]
    InvalidScore { score: f64 },

    #[error("Invalid unit price: {price}")]
    InvalidPrice { price: Decimal },

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Limit exceeded: {detail}")]
    LimitExceeded { detail: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Failed to decode {record} record: {detail}")]
    Decode {
        record: &'static str,
        detail: String,
    },

    #[error("Store operation {operation} failed: {detail}")]
    Store { operation: String, detail: String },
}

pub type Result<T> = std::result::Result<T, BookingError>;
